//! Result store seam.
//!
//! All cross-worker state lives behind [`TaskStore`]. Implementations must
//! make each method atomic per task id: in particular `mark_running` and
//! `complete` are compare-and-set operations, which is what keeps a
//! redelivered message from executing or overwriting a task twice.
//!
//! Expired records behave exactly like absent ones.

use std::time::Duration;

use async_trait::async_trait;

use stratlab_core::{IdempotencyKey, TaskId};

use crate::error::TraitError;
use crate::task::{TaskOutcome, TaskRecord, Transition};

/// Outcome of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyClaim {
    /// The key now maps to the proposed task
    Claimed,
    /// The key already maps to a live task
    Existing(TaskId),
}

/// Shared, TTL-bounded task store.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` for a live duplicate id.
    async fn create(&self, record: TaskRecord) -> Result<(), TraitError>;

    /// Fetch a live record.
    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, TraitError>;

    /// PENDING → RUNNING, or take over a RUNNING task whose claim is older
    /// than `lease`. Fails with `NotFound` for unknown or expired ids.
    async fn mark_running(&self, id: &TaskId, lease: Duration) -> Result<Transition, TraitError>;

    /// RUNNING → terminal, at most once. Fails with `NotFound` for unknown or
    /// expired ids.
    async fn complete(&self, id: &TaskId, outcome: TaskOutcome) -> Result<Transition, TraitError>;

    /// Remove a record. Returns whether one existed.
    async fn delete(&self, id: &TaskId) -> Result<bool, TraitError>;

    /// Map `key` to `task_id` unless it already maps to a live task.
    async fn claim_idempotency_key(
        &self,
        key: &IdempotencyKey,
        task_id: &TaskId,
        ttl: Duration,
    ) -> Result<IdempotencyClaim, TraitError>;

    /// Drop a key mapping. Returns whether one existed.
    async fn release_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, TraitError>;

    /// Remove expired records and key mappings. Returns how many records were removed.
    async fn purge_expired(&self) -> Result<usize, TraitError>;
}
