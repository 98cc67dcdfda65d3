//! Error types for risk calculations.

use thiserror::Error;

/// Errors that can occur during risk calculations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Invalid input parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Calculation failed
    #[error("calculation failed: {0}")]
    CalculationFailed(String),

    /// Insufficient data for calculation
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}
