//! Error types for dataset construction.

/// Errors raised when columns cannot form a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    /// Two columns share a name.
    DuplicateColumn(String),
    /// A column's row count differs from the first column's.
    RowCountMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateColumn(name) => write!(f, "Duplicate column '{}'", name),
            Self::RowCountMismatch {
                column,
                expected,
                actual,
            } => write!(
                f,
                "Column '{}' has {} rows, expected {}",
                column, actual, expected
            ),
        }
    }
}

impl std::error::Error for DatasetError {}
