//! Durable, append-only job status ledger.
//!
//! Every status transition of a job is one [`StatusRecord`] with its detail
//! messages. Records are never updated or deleted; a job's current status is
//! its record with the highest sequence number.

pub mod backend;
mod migrations;
mod postgres;
mod sqlite;

pub use postgres::PostgresStatusLedger;
pub use sqlite::SqliteStatusLedger;

use crate::config::LedgerConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    InProgress,
    Saving,
    Success,
    Failed,
    PartialSuccess,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::InProgress => "in_progress",
            StatusKind::Saving => "saving",
            StatusKind::Success => "success",
            StatusKind::Failed => "failed",
            StatusKind::PartialSuccess => "partial_success",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusKind::Success | StatusKind::Failed | StatusKind::PartialSuccess
        )
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(StatusKind::InProgress),
            "saving" => Ok(StatusKind::Saving),
            "success" => Ok(StatusKind::Success),
            "failed" => Ok(StatusKind::Failed),
            "partial_success" => Ok(StatusKind::PartialSuccess),
            other => anyhow::bail!("Unknown status '{}'", other),
        }
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub job_id: String,
    /// Strictly increasing within a job.
    pub sequence_no: i64,
    pub status: StatusKind,
    pub created_at: DateTime<Utc>,
    pub detail_messages: Vec<String>,
}

/// Async interface to the status ledger.
#[async_trait]
pub trait StatusLedger: Debug + Send + Sync {
    /// Close the ledger connection. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Apply any pending schema migrations. Idempotent.
    async fn run_migrations(&self) -> Result<()>;

    /// Append a status with its details in one transaction.
    async fn append(
        &self,
        job_id: &str,
        status: StatusKind,
        details: &[String],
    ) -> Result<StatusRecord>;

    /// The job's most recent record, if any.
    async fn latest(&self, job_id: &str) -> Result<Option<StatusRecord>>;

    /// Every record of the job, oldest first.
    async fn history(&self, job_id: &str) -> Result<Vec<StatusRecord>>;
}

/// Open the configured ledger and bring its schema up to date.
pub async fn connect(config: &LedgerConfig) -> Result<Arc<dyn StatusLedger>> {
    let ledger: Arc<dyn StatusLedger> = match config.ledger_type.as_str() {
        "sqlite" => Arc::new(SqliteStatusLedger::new(&config.path).await?),
        "postgres" => Arc::new(PostgresStatusLedger::new(&config.postgres_url()?).await?),
        other => anyhow::bail!("Invalid ledger type: {}", other),
    };
    ledger.run_migrations().await?;
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_kind_strings() {
        for kind in [
            StatusKind::InProgress,
            StatusKind::Saving,
            StatusKind::Success,
            StatusKind::Failed,
            StatusKind::PartialSuccess,
        ] {
            assert_eq!(kind.as_str().parse::<StatusKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
        assert!("done".parse::<StatusKind>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!StatusKind::InProgress.is_terminal());
        assert!(!StatusKind::Saving.is_terminal());
        assert!(StatusKind::Success.is_terminal());
        assert!(StatusKind::Failed.is_terminal());
        assert!(StatusKind::PartialSuccess.is_terminal());
    }
}
