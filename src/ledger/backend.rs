//! Database backend abstraction for the status ledger.
//!
//! [`LedgerBackend`] is generic over any sqlx database implementing
//! [`LedgerDatabase`] (currently Postgres and SQLite) and hides the
//! differences in parameter binding syntax behind one set of queries.

use super::{StatusKind, StatusRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{
    query, query_as, query_scalar, ColumnIndex, Database, Decode, Encode, Executor, FromRow,
    IntoArguments, Pool, Postgres, Sqlite, Type,
};
use std::borrow::Cow;
use std::collections::HashMap;

/// Extension trait for sqlx databases used as ledger storage.
///
/// Handles parameter binding syntax (`$1` for Postgres vs `?` for SQLite).
pub trait LedgerDatabase: Database {
    /// Returns the parameter placeholder for the given 1-based index.
    fn bind_param(index: usize) -> Cow<'static, str>;
}

impl LedgerDatabase for Postgres {
    fn bind_param(index: usize) -> Cow<'static, str> {
        Cow::Owned(format!("${}", index))
    }
}

impl LedgerDatabase for Sqlite {
    fn bind_param(_: usize) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }
}

/// A `job_status` row.
#[derive(Debug, Clone, FromRow)]
pub struct StatusRow {
    pub id: i64,
    pub job_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl StatusRow {
    fn into_record(self, detail_messages: Vec<String>) -> Result<StatusRecord> {
        Ok(StatusRecord {
            status: self.status.parse()?,
            job_id: self.job_id,
            sequence_no: self.id,
            created_at: self.created_at,
            detail_messages,
        })
    }
}

/// Generic database backend for ledger operations.
pub struct LedgerBackend<DB: LedgerDatabase> {
    pool: Pool<DB>,
}

impl<DB: LedgerDatabase> LedgerBackend<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

impl<DB> LedgerBackend<DB>
where
    DB: LedgerDatabase,
    StatusRow: for<'r> FromRow<'r, DB::Row>,
    (i64, String): for<'r> FromRow<'r, DB::Row>,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> i64: Encode<'q, DB> + Type<DB>,
    for<'r> i64: Decode<'r, DB>,
    for<'r> String: Decode<'r, DB> + Type<DB>,
    for<'q> DateTime<Utc>: Encode<'q, DB> + Type<DB>,
    for<'q> <DB as Database>::Arguments<'q>: IntoArguments<'q, DB> + Send,
    for<'c> &'c Pool<DB>: Executor<'c, Database = DB>,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    usize: ColumnIndex<DB::Row>,
{
    #[tracing::instrument(
        name = "ledger_append",
        skip(self, details),
        fields(
            sheetdrop.job_id = %job_id,
            sheetdrop.status = %status,
            sheetdrop.details = details.len(),
        )
    )]
    pub async fn append(
        &self,
        job_id: &str,
        status: StatusKind,
        details: &[String],
    ) -> Result<StatusRecord> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let insert_status = format!(
            "INSERT INTO job_status (job_id, status, created_at) VALUES ({}, {}, {}) RETURNING id",
            DB::bind_param(1),
            DB::bind_param(2),
            DB::bind_param(3),
        );
        let id: i64 = query_scalar::<DB, i64>(&insert_status)
            .bind(job_id)
            .bind(status.as_str())
            .bind(created_at)
            .fetch_one(&mut *tx)
            .await?;

        let insert_detail = format!(
            "INSERT INTO job_status_detail (status_id, message) VALUES ({}, {})",
            DB::bind_param(1),
            DB::bind_param(2),
        );
        for message in details {
            query(&insert_detail)
                .bind(id)
                .bind(message.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(StatusRecord {
            job_id: job_id.to_string(),
            sequence_no: id,
            status,
            created_at,
            detail_messages: details.to_vec(),
        })
    }

    pub async fn latest(&self, job_id: &str) -> Result<Option<StatusRecord>> {
        let mut tx = self.pool.begin().await?;

        let select_status = format!(
            "SELECT id, job_id, status, created_at FROM job_status \
             WHERE job_id = {} ORDER BY id DESC LIMIT 1",
            DB::bind_param(1)
        );
        let row = query_as::<DB, StatusRow>(&select_status)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let select_details = format!(
            "SELECT message FROM job_status_detail WHERE status_id = {} ORDER BY id",
            DB::bind_param(1)
        );
        let details: Vec<String> = query_scalar::<DB, String>(&select_details)
            .bind(row.id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        row.into_record(details).map(Some)
    }

    pub async fn history(&self, job_id: &str) -> Result<Vec<StatusRecord>> {
        let mut tx = self.pool.begin().await?;

        let select_statuses = format!(
            "SELECT id, job_id, status, created_at FROM job_status \
             WHERE job_id = {} ORDER BY id",
            DB::bind_param(1)
        );
        let rows = query_as::<DB, StatusRow>(&select_statuses)
            .bind(job_id)
            .fetch_all(&mut *tx)
            .await?;

        let select_details = format!(
            "SELECT d.status_id, d.message FROM job_status_detail d \
             JOIN job_status s ON s.id = d.status_id \
             WHERE s.job_id = {} ORDER BY d.id",
            DB::bind_param(1)
        );
        let detail_rows = query_as::<DB, (i64, String)>(&select_details)
            .bind(job_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut details: HashMap<i64, Vec<String>> = HashMap::new();
        for (status_id, message) in detail_rows {
            details.entry(status_id).or_default().push(message);
        }

        rows.into_iter()
            .map(|row| {
                let messages = details.remove(&row.id).unwrap_or_default();
                row.into_record(messages)
            })
            .collect()
    }
}
