//! Error types for decoding uploads

use crate::datasets::{DatasetError, SheetKey};
use thiserror::Error;

/// Errors that can occur while turning raw bytes into datasets
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No decoder is registered under the requested load type
    #[error("unknown load type '{0}'")]
    UnknownLoadType(String),

    /// Load parameters could not be understood
    #[error("invalid {format} load parameters: {message}")]
    InvalidParams { format: String, message: String },

    /// Bytes do not conform to the declared format
    #[error("malformed {format} input: {message}")]
    Malformed { format: String, message: String },

    /// A configured sheet is missing from the workbook
    #[error("sheet '{0}' not found")]
    SheetNotFound(SheetKey),

    /// The decoder can only produce a single dataset
    #[error("decoder '{0}' does not support multiple sheets")]
    MultiSheetUnsupported(String),

    /// Decoded columns do not form a valid dataset
    #[error("{0}")]
    Dataset(#[from] DatasetError),
}

impl DecodeError {
    pub(crate) fn malformed(format: &str, message: impl ToString) -> Self {
        DecodeError::Malformed {
            format: format.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_params(format: &str, message: impl ToString) -> Self {
        DecodeError::InvalidParams {
            format: format.to_string(),
            message: message.to_string(),
        }
    }
}
