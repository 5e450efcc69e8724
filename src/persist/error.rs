//! Error types for persistence

use super::{Provider, TableFormat};
use thiserror::Error;

/// Errors that can occur while writing a dataset to storage
#[derive(Debug, Error)]
pub enum PersistError {
    /// The (provider, format) pair has no writer
    #[error("unsupported combination: provider '{provider}' with format '{format}'")]
    UnsupportedCombination {
        provider: Provider,
        format: TableFormat,
    },

    /// Save parameters could not be understood
    #[error("invalid save parameters: {0}")]
    InvalidParams(String),

    /// Destination path does not fit the provider
    #[error("invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// Object store could not be built
    #[error("storage configuration failed: {0}")]
    Configuration(String),

    /// Dataset could not be encoded
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Object store operation failed
    #[error("storage write failed: {0}")]
    Store(#[from] object_store::Error),

    /// Table metadata is inconsistent with the write
    #[error("table error: {0}")]
    Table(String),
}

impl PersistError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PersistError::UnsupportedCombination { .. })
    }

    pub(crate) fn invalid_path(path: &str, message: impl ToString) -> Self {
        PersistError::InvalidPath {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<datafusion::parquet::errors::ParquetError> for PersistError {
    fn from(e: datafusion::parquet::errors::ParquetError) -> Self {
        PersistError::Encode(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PersistError {
    fn from(e: tokio::task::JoinError) -> Self {
        PersistError::Encode(format!("encoder task failed: {}", e))
    }
}
