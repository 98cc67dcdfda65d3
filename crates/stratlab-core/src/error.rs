//! Error types for core value construction.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Shrinkage parameter outside `[0, 1]`
    #[error("shrinkage lambda must be within [0, 1], got {0}")]
    InvalidLambda(f64),

    /// Empty or whitespace-only symbol
    #[error("symbol must not be empty")]
    EmptySymbol,

    /// Malformed task identifier
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// Malformed idempotency key
    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    /// Result retention of zero
    #[error("result ttl must be at least one second")]
    InvalidTtl,

    /// Invalid prior volatility
    #[error("prior volatility must be finite and non-negative, got {0}")]
    InvalidPrior(f64),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
