//! Error types for input normalization.

use thiserror::Error;

/// Errors that stop a dataset from being normalized.
///
/// Individual bad rows are not errors; they are reported as
/// [`SkipReason`](crate::SkipReason)s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required column is absent from the header
    #[error("missing required column '{column}' (accepted names: {accepted})")]
    MissingColumn {
        /// Canonical column name
        column: &'static str,
        /// Accepted aliases, comma separated
        accepted: String,
    },

    /// Nothing usable survived coercion
    #[error("no usable data: {0}")]
    NoUsableData(String),

    /// Input format is recognized but not supported
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// The file could not be decoded
    #[error("malformed input: {0}")]
    Malformed(String),

    /// IO failure
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ValidationError {
    fn from(e: std::io::Error) -> Self {
        ValidationError::Io(e.to_string())
    }
}

impl From<csv::Error> for ValidationError {
    fn from(e: csv::Error) -> Self {
        ValidationError::Malformed(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for ValidationError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        ValidationError::Malformed(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for ValidationError {
    fn from(e: arrow::error::ArrowError) -> Self {
        ValidationError::Malformed(e.to_string())
    }
}

/// Result type for normalization.
pub type ValidationResult<T> = Result<T, ValidationError>;
