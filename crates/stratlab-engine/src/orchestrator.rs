//! Submission, polling and result retrieval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use stratlab_core::{AnalysisRequest, IdempotencyKey, TaskId};
use stratlab_traits::queue::{TaskMessage, TaskQueue};
use stratlab_traits::store::{IdempotencyClaim, TaskStore};
use stratlab_traits::task::{TaskOutcome, TaskRecord, TaskSnapshot};

use crate::error::EngineError;
use crate::runtime::RetryConfig;

/// Acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Task tracking the request
    pub task_id: TaskId,
    /// Whether an earlier submission with the same idempotency key was returned
    pub deduplicated: bool,
}

/// Front door of the task system: `submit`, `poll`, `fetch_result`.
pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    result_ttl: Duration,
    retry: RetryConfig,
}

impl TaskOrchestrator {
    /// Create an orchestrator over a store and a queue.
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        result_ttl: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            queue,
            result_ttl,
            retry,
        }
    }

    /// Record a PENDING task and enqueue the request.
    ///
    /// With an idempotency key, a repeated submission returns the live task
    /// already mapped to that key. Without one, every call creates a task.
    /// If the broker stays unreachable after retries, the task is removed
    /// and `Infrastructure` is returned.
    pub async fn submit(
        &self,
        request: AnalysisRequest,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Submission, EngineError> {
        request.validate()?;

        let task_id = TaskId::generate();
        let ttl = request.result_ttl().unwrap_or(self.result_ttl);

        let record = TaskRecord::pending(task_id.clone(), ttl, Utc::now());
        self.retry
            .run("create task", || self.store.create(record.clone()))
            .await?;

        // The record exists before the key is claimed, so a key never points
        // at a task that has not been created yet.
        if let Some(key) = &idempotency_key {
            let claimed = match self.claim_key(key, &task_id, ttl).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    self.withdraw(&task_id).await;
                    return Err(e);
                }
            };
            if let Some(existing) = claimed {
                self.withdraw(&task_id).await;
                debug!(task_id = %existing, key = %key, "duplicate submission");
                return Ok(Submission {
                    task_id: existing,
                    deduplicated: true,
                });
            }
        }

        let message = TaskMessage::new(task_id.clone(), Arc::new(request));
        let enqueued = self
            .retry
            .run("enqueue task", || self.queue.enqueue(message.clone()))
            .await;
        if let Err(e) = enqueued {
            error!(task_id = %task_id, error = %e, "enqueue failed, withdrawing task");
            self.withdraw(&task_id).await;
            self.release_key(idempotency_key.as_ref()).await;
            return Err(EngineError::Infrastructure(format!("broker unavailable: {e}")));
        }

        info!(task_id = %task_id, ttl_secs = ttl.as_secs(), "task submitted");
        Ok(Submission {
            task_id,
            deduplicated: false,
        })
    }

    /// Claim `key` for `task_id`. Returns the task already holding it, if live.
    async fn claim_key(
        &self,
        key: &IdempotencyKey,
        task_id: &TaskId,
        ttl: Duration,
    ) -> Result<Option<TaskId>, EngineError> {
        // The second pass covers a key whose task expired before the key did.
        for _ in 0..2 {
            let claim = self
                .retry
                .run("claim idempotency key", || {
                    self.store.claim_idempotency_key(key, task_id, ttl)
                })
                .await?;
            let existing = match claim {
                IdempotencyClaim::Claimed => return Ok(None),
                IdempotencyClaim::Existing(existing) => existing,
            };
            if self.load(&existing).await?.is_some() {
                return Ok(Some(existing));
            }
            self.store.release_idempotency_key(key).await?;
        }
        Err(EngineError::Internal(format!(
            "idempotency key {key} could not be claimed"
        )))
    }

    async fn withdraw(&self, task_id: &TaskId) {
        if let Err(e) = self.store.delete(task_id).await {
            warn!(task_id = %task_id, error = %e, "failed to remove unqueued task");
        }
    }

    async fn release_key(&self, key: Option<&IdempotencyKey>) {
        if let Some(key) = key {
            if let Err(e) = self.store.release_idempotency_key(key).await {
                warn!(key = %key, error = %e, "failed to release idempotency key");
            }
        }
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, EngineError> {
        Ok(self
            .retry
            .run("load task", || self.store.get(task_id))
            .await?)
    }

    /// Current status. Unknown and expired ids are `NotFound`.
    pub async fn poll(&self, task_id: &TaskId) -> Result<TaskSnapshot, EngineError> {
        self.load(task_id)
            .await?
            .map(|record| record.snapshot())
            .ok_or_else(|| EngineError::NotFound(task_id.clone()))
    }

    /// Terminal outcome. `NotReady` while PENDING or RUNNING.
    pub async fn fetch_result(&self, task_id: &TaskId) -> Result<TaskOutcome, EngineError> {
        let record = self
            .load(task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.clone()))?;

        record.outcome().ok_or_else(|| EngineError::NotReady {
            task_id: task_id.clone(),
            status: record.status,
        })
    }

    /// Messages waiting for a worker.
    pub async fn queue_depth(&self) -> Result<usize, EngineError> {
        Ok(self.queue.depth().await?)
    }

    /// Default retention for task records.
    pub fn result_ttl(&self) -> Duration {
        self.result_ttl
    }
}
