//! Message broker seam.

use std::sync::Arc;

use async_trait::async_trait;

use stratlab_core::{AnalysisRequest, TaskId};

use crate::error::TraitError;

/// A unit of work handed to a worker.
#[derive(Debug, Clone)]
pub struct TaskMessage {
    /// Task the work belongs to
    pub task_id: TaskId,
    /// Immutable request payload
    pub request: Arc<AnalysisRequest>,
    /// Delivery attempt, starting at 1
    pub delivery: u32,
}

impl TaskMessage {
    /// First delivery of a request.
    pub fn new(task_id: TaskId, request: Arc<AnalysisRequest>) -> Self {
        Self {
            task_id,
            request,
            delivery: 1,
        }
    }

    /// The same message, delivered again.
    pub fn redelivered(&self) -> Self {
        Self {
            delivery: self.delivery.saturating_add(1),
            ..self.clone()
        }
    }
}

/// FIFO broker between the orchestrator and its workers.
///
/// Delivery may be at-least-once; workers guard against duplicates through
/// the task store.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publish a message.
    async fn enqueue(&self, message: TaskMessage) -> Result<(), TraitError>;

    /// Wait for the next message. `None` once the queue is closed and drained.
    async fn dequeue(&self) -> Result<Option<TaskMessage>, TraitError>;

    /// Messages waiting for a worker.
    async fn depth(&self) -> Result<usize, TraitError>;
}
