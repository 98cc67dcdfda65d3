//! API error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use stratlab_core::CoreError;
use stratlab_data::ValidationError;
use stratlab_engine::EngineError;

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown or expired task.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Task has not reached a terminal state.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The dataset cannot be analysed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Broker or store unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorBody,
}

/// Error body details.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::NotReady(_) => (StatusCode::CONFLICT, "NOT_READY"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
        });

        (status, body).into_response()
    }
}

// Conversions from domain errors
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::NotReady { .. } => ApiError::NotReady(err.to_string()),
            EngineError::InvalidRequest(_) => ApiError::BadRequest(err.to_string()),
            EngineError::Infrastructure(_) | EngineError::Shutdown => {
                ApiError::Unavailable(err.to_string())
            }
            EngineError::ConfigError(_) | EngineError::Internal(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingColumn { .. } | ValidationError::NoUsableData(_) => {
                ApiError::Validation(err.to_string())
            }
            ValidationError::UnsupportedFormat(_) | ValidationError::Malformed(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ValidationError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
