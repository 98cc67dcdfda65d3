//! In-process broker and result store.
//!
//! Used for `memory://` deployments and tests. Each store method locks only
//! the shard that holds the task, so state transitions are atomic per id.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use stratlab_core::{IdempotencyKey, TaskId};
use stratlab_traits::error::TraitError;
use stratlab_traits::queue::{TaskMessage, TaskQueue};
use stratlab_traits::store::{IdempotencyClaim, TaskStore};
use stratlab_traits::task::{TaskOutcome, TaskRecord, Transition};

// =============================================================================
// TASK STORE
// =============================================================================

/// TTL-bounded task store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, TaskRecord>,
    keys: DashMap<IdempotencyKey, (TaskId, DateTime<Utc>)>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn update(
        &self,
        id: &TaskId,
        transition: impl FnOnce(&mut TaskRecord, DateTime<Utc>) -> Transition,
    ) -> Result<Transition, TraitError> {
        let now = Utc::now();
        match self.tasks.get_mut(id) {
            Some(mut record) if !record.is_expired(now) => Ok(transition(&mut *record, now)),
            _ => Err(TraitError::NotFound(format!("task {id}"))),
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: TaskRecord) -> Result<(), TraitError> {
        let now = Utc::now();
        match self.tasks.entry(record.id.clone()) {
            Entry::Occupied(existing) if !existing.get().is_expired(now) => Err(
                TraitError::AlreadyExists(format!("task {}", existing.key())),
            ),
            Entry::Occupied(mut expired) => {
                expired.insert(record);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, TraitError> {
        let now = Utc::now();
        Ok(self
            .tasks
            .get(id)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.value().clone()))
    }

    async fn mark_running(&self, id: &TaskId, lease: Duration) -> Result<Transition, TraitError> {
        self.update(id, |record, now| record.start(now, lease))
    }

    async fn complete(&self, id: &TaskId, outcome: TaskOutcome) -> Result<Transition, TraitError> {
        self.update(id, |record, now| record.finish(outcome, now))
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, TraitError> {
        Ok(self.tasks.remove(id).is_some())
    }

    async fn claim_idempotency_key(
        &self,
        key: &IdempotencyKey,
        task_id: &TaskId,
        ttl: Duration,
    ) -> Result<IdempotencyClaim, TraitError> {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        match self.keys.entry(key.clone()) {
            Entry::Occupied(entry) if now < entry.get().1 => {
                Ok(IdempotencyClaim::Existing(entry.get().0.clone()))
            }
            Entry::Occupied(mut stale) => {
                stale.insert((task_id.clone(), expires_at));
                Ok(IdempotencyClaim::Claimed)
            }
            Entry::Vacant(slot) => {
                slot.insert((task_id.clone(), expires_at));
                Ok(IdempotencyClaim::Claimed)
            }
        }
    }

    async fn release_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, TraitError> {
        Ok(self.keys.remove(key).is_some())
    }

    async fn purge_expired(&self) -> Result<usize, TraitError> {
        let now = Utc::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, record| !record.is_expired(now));
        self.keys.retain(|_, (_, expires_at)| now < *expires_at);
        let purged = before.saturating_sub(self.tasks.len());
        if purged > 0 {
            debug!(purged, "purged expired tasks");
        }
        Ok(purged)
    }
}

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Unbounded FIFO queue shared by the workers of one process.
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    tx: mpsc::UnboundedSender<TaskMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<TaskMessage>>,
    depth: AtomicUsize,
}

impl InMemoryTaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Stop accepting messages. Queued messages can still be dequeued.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, message: TaskMessage) -> Result<(), TraitError> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(message).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            TraitError::Closed(format!("queue closed, dropped task {}", e.0.task_id))
        })
    }

    async fn dequeue(&self) -> Result<Option<TaskMessage>, TraitError> {
        let message = self.rx.lock().await.recv().await;
        if message.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(message)
    }

    async fn depth(&self) -> Result<usize, TraitError> {
        Ok(self.depth.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stratlab_core::{AnalysisRequest, RawTable};
    use stratlab_traits::task::{FailureDetail, FailureKind, TaskStatus, DEFAULT_LEASE};

    fn record(id: &str, ttl_secs: u64) -> TaskRecord {
        TaskRecord::pending(TaskId::new(id), Duration::from_secs(ttl_secs), Utc::now())
    }

    fn failure() -> TaskOutcome {
        TaskOutcome::Failure {
            error: FailureDetail::new(FailureKind::ComputationFailed, "boom"),
        }
    }

    #[tokio::test]
    async fn test_store_transitions() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new("a");
        store.create(record("a", 60)).await.unwrap();

        assert!(store.mark_running(&id, DEFAULT_LEASE).await.unwrap().is_applied());
        assert_eq!(
            store.mark_running(&id, DEFAULT_LEASE).await.unwrap(),
            Transition::Rejected(TaskStatus::Running)
        );
        assert!(store.complete(&id, failure()).await.unwrap().is_applied());
        assert_eq!(
            store.complete(&id, failure()).await.unwrap(),
            Transition::Rejected(TaskStatus::Failure)
        );
    }

    #[tokio::test]
    async fn test_lapsed_claim_is_taken_over() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new("a");
        store.create(record("a", 60)).await.unwrap();

        assert!(store.mark_running(&id, DEFAULT_LEASE).await.unwrap().is_applied());
        assert!(store.mark_running(&id, Duration::ZERO).await.unwrap().is_applied());
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_expired_records_are_invisible() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new("a");
        store.create(record("a", 0)).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.mark_running(&id, DEFAULT_LEASE).await.is_err());
        // An expired id may be reused.
        store.create(record("a", 60)).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge() {
        let store = InMemoryTaskStore::new();
        store.create(record("old", 0)).await.unwrap();
        store.create(record("new", 60)).await.unwrap();
        let key = IdempotencyKey::new("k").unwrap();
        store
            .claim_idempotency_key(&key, &TaskId::new("old"), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.release_idempotency_key(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_queue_fifo_and_depth() {
        let queue = InMemoryTaskQueue::new();
        let request = Arc::new(AnalysisRequest::new(RawTable::default()));

        queue
            .enqueue(TaskMessage::new(TaskId::new("1"), request.clone()))
            .await
            .unwrap();
        queue
            .enqueue(TaskMessage::new(TaskId::new("2"), request))
            .await
            .unwrap();
        assert_eq!(queue.depth().await.unwrap(), 2);

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.task_id, TaskId::new("1"));
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_and_drains() {
        let queue = InMemoryTaskQueue::new();
        let request = Arc::new(AnalysisRequest::new(RawTable::default()));
        queue
            .enqueue(TaskMessage::new(TaskId::new("1"), request.clone()))
            .await
            .unwrap();
        queue.close().await;

        let err = queue
            .enqueue(TaskMessage::new(TaskId::new("2"), request))
            .await
            .unwrap_err();
        assert!(matches!(err, TraitError::Closed(_)));
        assert!(queue.dequeue().await.unwrap().is_some());
        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }
}
