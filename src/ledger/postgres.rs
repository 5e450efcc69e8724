use super::backend::LedgerBackend;
use super::migrations::{run_migrations, LedgerMigrations};
use super::{StatusKind, StatusLedger, StatusRecord};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::fmt::{self, Debug, Formatter};

pub struct PostgresStatusLedger {
    backend: LedgerBackend<Postgres>,
}

struct PostgresMigrationBackend;

impl PostgresStatusLedger {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;

        Ok(Self {
            backend: LedgerBackend::new(pool),
        })
    }
}

impl Debug for PostgresStatusLedger {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStatusLedger")
            .field("pool", self.backend.pool())
            .finish()
    }
}

#[async_trait]
impl StatusLedger for PostgresStatusLedger {
    async fn close(&self) -> Result<()> {
        self.backend.pool().close().await;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        run_migrations::<PostgresMigrationBackend>(self.backend.pool()).await?;
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

impl LedgerMigrations for PostgresMigrationBackend {
    type Pool = PgPool;

    fn ensure_migrations_table(pool: &Self::Pool) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version BIGINT PRIMARY KEY,
                    applied_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
                )",
            )
            .execute(pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn current_version(pool: &Self::Pool) -> BoxFuture<'_, Result<i64>> {
        async move {
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0)::BIGINT FROM schema_migrations")
                .fetch_one(pool)
                .await
                .map_err(Into::into)
        }
        .boxed()
    }

    fn record_version(pool: &Self::Pool, version: i64) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
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
                "CREATE TABLE IF NOT EXISTS job_status (
                    id BIGSERIAL PRIMARY KEY,
                    job_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )",
            )
            .execute(pool)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS job_status_detail (
                    id BIGSERIAL PRIMARY KEY,
                    status_id BIGINT NOT NULL REFERENCES job_status(id),
                    message TEXT NOT NULL
                )",
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
