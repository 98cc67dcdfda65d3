//! Engine error types.

use thiserror::Error;

use stratlab_core::{CoreError, TaskId};
use stratlab_traits::{TaskStatus, TraitError};

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Task unknown or expired
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Task has not reached a terminal state
    #[error("task {task_id} is not ready (status {status})")]
    NotReady {
        /// The task
        task_id: TaskId,
        /// Its current status
        status: TaskStatus,
    },

    /// Request rejected before submission
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Broker or result store unavailable after retries
    #[error("infrastructure unavailable: {0}")]
    Infrastructure(String),

    /// Shutdown
    #[error("engine is shutting down")]
    Shutdown,

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TraitError> for EngineError {
    fn from(e: TraitError) -> Self {
        match e {
            TraitError::InvalidInput(msg) => EngineError::InvalidRequest(msg),
            TraitError::Closed(_) => EngineError::Shutdown,
            e if e.is_transient() => EngineError::Infrastructure(e.to_string()),
            e => EngineError::Internal(e.to_string()),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        EngineError::InvalidRequest(e.to_string())
    }
}
