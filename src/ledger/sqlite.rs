use super::backend::LedgerBackend;
use super::migrations::{run_migrations, LedgerMigrations};
use super::{StatusKind, StatusLedger, StatusRecord};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;
use std::time::Duration;

pub struct SqliteStatusLedger {
    backend: LedgerBackend<Sqlite>,
    ledger_path: String,
}

impl Debug for SqliteStatusLedger {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStatusLedger")
            .field("ledger_path", &self.ledger_path)
            .finish()
    }
}

struct SqliteMigrationBackend;

impl SqliteStatusLedger {
    pub async fn new(db_path: &str) -> Result<Self> {
        // Concurrent jobs append from separate pool connections.
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            backend: LedgerBackend::new(pool),
            ledger_path: db_path.to_string(),
        })
    }
}

#[async_trait]
impl StatusLedger for SqliteStatusLedger {
    async fn close(&self) -> Result<()> {
        self.backend.pool().close().await;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        run_migrations::<SqliteMigrationBackend>(self.backend.pool()).await?;
        Ok(())
    }

    async fn append(
        &self,
        job_id: &str,
        status: StatusKind,
        details: &[String],
    ) -> Result<StatusRecord> {
        self.backend.append(job_id, status, details).await
    }

    async fn latest(&self, job_id: &str) -> Result<Option<StatusRecord>> {
        self.backend.latest(job_id).await
    }

    async fn history(&self, job_id: &str) -> Result<Vec<StatusRecord>> {
        self.backend.history(job_id).await
    }
}

impl LedgerMigrations for SqliteMigrationBackend {
    type Pool = SqlitePool;

    fn ensure_migrations_table(pool: &Self::Pool) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )
                "#,
            )
            .execute(pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn current_version(pool: &Self::Pool) -> BoxFuture<'_, Result<i64>> {
        async move {
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(pool)
                .await
                .map_err(Into::into)
        }
        .boxed()
    }

    fn record_version(pool: &Self::Pool, version: i64) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
                .bind(version)
                .execute(pool)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn migrate_v1(pool: &Self::Pool) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS job_status (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
            )
            .execute(pool)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS job_status_detail (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    status_id INTEGER NOT NULL REFERENCES job_status(id),
                    message TEXT NOT NULL
                )
                "#,
            )
            .execute(pool)
            .await?;

            Ok(())
        }
        .boxed()
    }

    fn migrate_v2(pool: &Self::Pool) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_status_job ON job_status (job_id, id)")
                .execute(pool)
                .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_job_status_detail_status ON job_status_detail (status_id)",
            )
            .execute(pool)
            .await?;
            Ok(())
        }
        .boxed()
    }
}
