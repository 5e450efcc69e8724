//! Versioned schema migrations for the status ledger.
//!
//! Applied versions are recorded in `schema_migrations`. A ledger whose
//! recorded version is newer than [`LATEST_VERSION`] was written by a newer
//! build and is refused rather than appended to.

use anyhow::{Context, Result};
use futures::future::BoxFuture;

/// Highest schema version this build knows how to write.
pub const LATEST_VERSION: i64 = 2;

type MigrationFn<P> = for<'a> fn(&'a P) -> BoxFuture<'a, Result<()>>;

struct Migration<P> {
    version: i64,
    name: &'static str,
    apply: MigrationFn<P>,
}

pub trait LedgerMigrations {
    type Pool;

    fn ensure_migrations_table(pool: &Self::Pool) -> BoxFuture<'_, Result<()>>;
    fn current_version(pool: &Self::Pool) -> BoxFuture<'_, Result<i64>>;
    fn record_version(pool: &Self::Pool, version: i64) -> BoxFuture<'_, Result<()>>;

    /// Status and detail tables.
    fn migrate_v1(pool: &Self::Pool) -> BoxFuture<'_, Result<()>>;
    /// Per-job lookup index.
    fn migrate_v2(pool: &Self::Pool) -> BoxFuture<'_, Result<()>>;
}

fn ledger_migrations<M: LedgerMigrations>() -> [Migration<M::Pool>; 2] {
    [
        Migration {
            version: 1,
            name: "status and detail tables",
            apply: M::migrate_v1,
        },
        Migration {
            version: 2,
            name: "job lookup indexes",
            apply: M::migrate_v2,
        },
    ]
}

/// Bring the ledger schema to [`LATEST_VERSION`]. Returns the resulting version.
pub async fn run_migrations<M: LedgerMigrations>(pool: &M::Pool) -> Result<i64> {
    M::ensure_migrations_table(pool)
        .await
        .context("Failed to create ledger migrations table")?;

    let current = M::current_version(pool)
        .await
        .context("Failed to read ledger schema version")?;
    if current > LATEST_VERSION {
        anyhow::bail!(
            "Ledger schema version {} is newer than supported version {}",
            current,
            LATEST_VERSION
        );
    }

    for migration in ledger_migrations::<M>() {
        if migration.version <= current {
            continue;
        }
        (migration.apply)(pool).await.with_context(|| {
            format!(
                "Ledger migration v{} ({}) failed",
                migration.version, migration.name
            )
        })?;
        M::record_version(pool, migration.version).await?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied ledger migration"
        );
    }

    Ok(LATEST_VERSION)
}
