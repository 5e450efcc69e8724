//! Error types for job registry construction

use crate::schema::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

/// A job definition that could not be turned into a configuration.
///
/// The job is left out of the registry; other jobs are unaffected.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Definition file or directory could not be read
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Definition is not valid JSON or has unknown fields
    #[error("job '{job_id}': malformed definition: {message}")]
    Parse { job_id: String, message: String },

    /// Definition parsed but is not usable
    #[error("job '{job_id}': {message}")]
    Invalid { job_id: String, message: String },

    /// Schema could not be compiled
    #[error("job '{job_id}': {source}")]
    Schema {
        job_id: String,
        #[source]
        source: SchemaError,
    },

    /// Two definitions share a job id
    #[error("job '{0}' is defined more than once")]
    Duplicate(String),
}

impl ConfigurationError {
    pub(crate) fn invalid(job_id: &str, message: impl ToString) -> Self {
        ConfigurationError::Invalid {
            job_id: job_id.to_string(),
            message: message.to_string(),
        }
    }
}
