//! # StratLab Ext Redb
//!
//! Embedded, persistent [`TaskStore`] backed by redb.
//!
//! Each state transition runs inside a single redb write transaction. redb
//! serializes writers, so the read-check-write of `mark_running` and
//! `complete` is atomic per database and a terminal state can never be
//! overwritten.
//!
//! Records are stored as bytes produced by a [`Codec`]; [`JsonCodec`] is the
//! default.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stratlab_core::{IdempotencyKey, TaskId};
use stratlab_ext_json::JsonCodec;
use stratlab_traits::error::TraitError;
use stratlab_traits::store::{IdempotencyClaim, TaskStore};
use stratlab_traits::task::{TaskOutcome, TaskRecord, Transition};
use stratlab_traits::transport::Codec;

// Table definitions
const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
const IDEMPOTENCY_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("idempotency_keys");

fn db_err(e: impl std::fmt::Display) -> TraitError {
    TraitError::DatabaseError(e.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyEntry {
    task_id: TaskId,
    expires_at: DateTime<Utc>,
}

/// Redb-based task store.
pub struct RedbTaskStore<C = JsonCodec> {
    db: Arc<Database>,
    codec: C,
}

impl RedbTaskStore<JsonCodec> {
    /// Wrap an open database with JSON-encoded records, creating the tables
    /// if needed.
    pub fn new(db: Arc<Database>) -> Result<Self, TraitError> {
        Self::with_codec(db, JsonCodec::new())
    }
}

impl<C: Codec> RedbTaskStore<C> {
    /// Wrap an open database, encoding records with `codec`.
    pub fn with_codec(db: Arc<Database>, codec: C) -> Result<Self, TraitError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            write_txn.open_table(TASKS).map_err(db_err)?;
            write_txn.open_table(IDEMPOTENCY_KEYS).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(Self { db, codec })
    }

    /// Content type of the stored record bytes.
    pub fn content_type(&self) -> &'static str {
        self.codec.content_type()
    }

    fn decode_record(&self, bytes: &[u8]) -> Result<TaskRecord, TraitError> {
        self.codec.decode(bytes)
    }

    fn decode_key(&self, bytes: &[u8]) -> Result<KeyEntry, TraitError> {
        self.codec.decode(bytes)
    }

    /// Apply `transition` to a live record inside one write transaction.
    fn update(
        &self,
        id: &TaskId,
        transition: impl FnOnce(&mut TaskRecord, DateTime<Utc>) -> Transition,
    ) -> Result<Transition, TraitError> {
        let now = Utc::now();
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let applied = {
            let mut table = write_txn.open_table(TASKS).map_err(db_err)?;
            let existing = match table.get(id.as_str()).map_err(db_err)? {
                Some(data) => Some(self.decode_record(data.value())?),
                None => None,
            };
            let mut record = match existing {
                Some(record) if !record.is_expired(now) => record,
                _ => return Err(TraitError::NotFound(format!("task {id}"))),
            };

            let applied = transition(&mut record, now);
            if applied.is_applied() {
                let bytes = self.codec.encode(&record)?;
                table
                    .insert(id.as_str(), bytes.as_ref())
                    .map_err(db_err)?;
            }
            applied
        };
        write_txn.commit().map_err(db_err)?;
        Ok(applied)
    }
}

#[async_trait]
impl<C: Codec + 'static> TaskStore for RedbTaskStore<C> {
    async fn create(&self, record: TaskRecord) -> Result<(), TraitError> {
        let now = Utc::now();
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(TASKS).map_err(db_err)?;
            let live = match table.get(record.id.as_str()).map_err(db_err)? {
                Some(data) => !self.decode_record(data.value())?.is_expired(now),
                None => false,
            };
            if live {
                return Err(TraitError::AlreadyExists(format!("task {}", record.id)));
            }

            let bytes = self.codec.encode(&record)?;
            table
                .insert(record.id.as_str(), bytes.as_ref())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, TraitError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;

        let table = match read_txn.open_table(TASKS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(db_err(e)),
        };

        match table.get(id.as_str()) {
            Ok(Some(data)) => {
                let record = self.decode_record(data.value())?;
                Ok((!record.is_expired(Utc::now())).then_some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn mark_running(&self, id: &TaskId, lease: Duration) -> Result<Transition, TraitError> {
        self.update(id, |record, now| record.start(now, lease))
    }

    async fn complete(&self, id: &TaskId, outcome: TaskOutcome) -> Result<Transition, TraitError> {
        self.update(id, |record, now| record.finish(outcome, now))
    }

    async fn delete(&self, id: &TaskId) -> Result<bool, TraitError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let deleted = {
            let mut table = write_txn.open_table(TASKS).map_err(db_err)?;
            let removed = table.remove(id.as_str()).map_err(db_err)?;
            removed.is_some()
        };
        write_txn.commit().map_err(db_err)?;
        Ok(deleted)
    }

    async fn claim_idempotency_key(
        &self,
        key: &IdempotencyKey,
        task_id: &TaskId,
        ttl: Duration,
    ) -> Result<IdempotencyClaim, TraitError> {
        let now = Utc::now();
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(IDEMPOTENCY_KEYS).map_err(db_err)?;
            let existing = match table.get(key.as_str()).map_err(db_err)? {
                Some(data) => Some(self.decode_key(data.value())?),
                None => None,
            };
            if let Some(entry) = existing.filter(|e| now < e.expires_at) {
                return Ok(IdempotencyClaim::Existing(entry.task_id));
            }

            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let entry = KeyEntry {
                task_id: task_id.clone(),
                expires_at,
            };
            let bytes = self.codec.encode(&entry)?;
            table
                .insert(key.as_str(), bytes.as_ref())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(IdempotencyClaim::Claimed)
    }

    async fn release_idempotency_key(&self, key: &IdempotencyKey) -> Result<bool, TraitError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let released = {
            let mut table = write_txn.open_table(IDEMPOTENCY_KEYS).map_err(db_err)?;
            let removed = table.remove(key.as_str()).map_err(db_err)?;
            removed.is_some()
        };
        write_txn.commit().map_err(db_err)?;
        Ok(released)
    }

    async fn purge_expired(&self) -> Result<usize, TraitError> {
        let now = Utc::now();
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let purged = {
            let mut tasks = write_txn.open_table(TASKS).map_err(db_err)?;
            let mut expired = Vec::new();
            for item in tasks.iter().map_err(db_err)? {
                let (id, data) = item.map_err(db_err)?;
                // Unreadable records are dropped along with expired ones.
                let stale = self
                    .decode_record(data.value())
                    .map_or(true, |r| r.is_expired(now));
                if stale {
                    expired.push(id.value().to_string());
                }
            }
            for id in &expired {
                tasks.remove(id.as_str()).map_err(db_err)?;
            }

            let mut keys = write_txn.open_table(IDEMPOTENCY_KEYS).map_err(db_err)?;
            let mut stale_keys = Vec::new();
            for item in keys.iter().map_err(db_err)? {
                let (key, data) = item.map_err(db_err)?;
                let stale = self
                    .decode_key(data.value())
                    .map_or(true, |e| now >= e.expires_at);
                if stale {
                    stale_keys.push(key.value().to_string());
                }
            }
            for key in &stale_keys {
                keys.remove(key.as_str()).map_err(db_err)?;
            }

            expired.len()
        };
        write_txn.commit().map_err(db_err)?;

        if purged > 0 {
            debug!(purged, "purged expired tasks");
        }
        Ok(purged)
    }
}

/// Open (or create) a persistent task store at `path`.
pub fn create_redb_task_store(path: impl AsRef<Path>) -> Result<RedbTaskStore, TraitError> {
    let db = Arc::new(Database::create(path).map_err(db_err)?);
    RedbTaskStore::new(db)
}

/// Create a non-persistent task store for testing.
pub fn create_memory_task_store() -> Result<RedbTaskStore, TraitError> {
    let db = Database::builder()
        .create_with_backend(redb::backends::InMemoryBackend::new())
        .map_err(db_err)?;
    RedbTaskStore::new(Arc::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratlab_ext_json::PrettyJsonCodec;
    use stratlab_traits::task::{FailureDetail, FailureKind, TaskStatus, DEFAULT_LEASE};

    fn record(id: &str, ttl_secs: u64) -> TaskRecord {
        TaskRecord::pending(TaskId::new(id), Duration::from_secs(ttl_secs), Utc::now())
    }

    fn failure(message: &str) -> TaskOutcome {
        TaskOutcome::Failure {
            error: FailureDetail::new(FailureKind::ComputationFailed, message),
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = create_memory_task_store().unwrap();
        let id = TaskId::new("task-1");
        store.create(record("task-1", 60)).await.unwrap();

        let pending = store.get(&id).await.unwrap().unwrap();
        assert_eq!(pending.status, TaskStatus::Pending);

        assert!(store.mark_running(&id, DEFAULT_LEASE).await.unwrap().is_applied());
        assert!(store.complete(&id, failure("first")).await.unwrap().is_applied());

        let done = store.get(&id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Failure);
        assert_eq!(done.error.unwrap().message, "first");
    }

    #[tokio::test]
    async fn test_complete_is_write_once() {
        let store = create_memory_task_store().unwrap();
        let id = TaskId::new("task-1");
        store.create(record("task-1", 60)).await.unwrap();
        store.mark_running(&id, DEFAULT_LEASE).await.unwrap();
        store.complete(&id, failure("first")).await.unwrap();

        let second = store.complete(&id, failure("second")).await.unwrap();
        assert_eq!(second, Transition::Rejected(TaskStatus::Failure));
        assert_eq!(
            store.mark_running(&id, DEFAULT_LEASE).await.unwrap(),
            Transition::Rejected(TaskStatus::Failure)
        );

        let done = store.get(&id).await.unwrap().unwrap();
        assert_eq!(done.error.unwrap().message, "first");
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = create_memory_task_store().unwrap();
        store.create(record("task-1", 60)).await.unwrap();
        let err = store.create(record("task-1", 60)).await.unwrap_err();
        assert!(matches!(err, TraitError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_expired_task_is_not_found() {
        let store = create_memory_task_store().unwrap();
        let id = TaskId::new("gone");
        store.create(record("gone", 0)).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
        assert!(matches!(
            store.mark_running(&id, DEFAULT_LEASE).await.unwrap_err(),
            TraitError::NotFound(_)
        ));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let store = create_memory_task_store().unwrap();
        let id = TaskId::new("missing");
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(matches!(
            store.complete(&id, failure("x")).await.unwrap_err(),
            TraitError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_idempotency_keys() {
        let store = create_memory_task_store().unwrap();
        let key = IdempotencyKey::new("upload-42").unwrap();
        let ttl = Duration::from_secs(60);

        let first = store
            .claim_idempotency_key(&key, &TaskId::new("a"), ttl)
            .await
            .unwrap();
        assert_eq!(first, IdempotencyClaim::Claimed);

        let second = store
            .claim_idempotency_key(&key, &TaskId::new("b"), ttl)
            .await
            .unwrap();
        assert_eq!(second, IdempotencyClaim::Existing(TaskId::new("a")));

        assert!(store.release_idempotency_key(&key).await.unwrap());
        let third = store
            .claim_idempotency_key(&key, &TaskId::new("c"), ttl)
            .await
            .unwrap();
        assert_eq!(third, IdempotencyClaim::Claimed);
    }

    #[tokio::test]
    async fn test_expired_key_can_be_reclaimed() {
        let store = create_memory_task_store().unwrap();
        let key = IdempotencyKey::new("k").unwrap();
        store
            .claim_idempotency_key(&key, &TaskId::new("a"), Duration::ZERO)
            .await
            .unwrap();
        let claim = store
            .claim_idempotency_key(&key, &TaskId::new("b"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(claim, IdempotencyClaim::Claimed);
    }

    #[tokio::test]
    async fn test_records_go_through_codec() {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .unwrap();
        let store = RedbTaskStore::with_codec(Arc::new(db), PrettyJsonCodec::new()).unwrap();
        assert_eq!(store.content_type(), "application/json");

        let id = TaskId::new("pretty");
        store.create(record("pretty", 60)).await.unwrap();
        assert!(store.mark_running(&id, DEFAULT_LEASE).await.unwrap().is_applied());

        let read_txn = store.db.begin_read().unwrap();
        let table = read_txn.open_table(TASKS).unwrap();
        let raw = table.get("pretty").unwrap().unwrap();
        let text = std::str::from_utf8(raw.value()).unwrap().to_string();
        assert!(text.contains('\n'));
        assert!(text.contains("\"status\": \"RUNNING\""));
    }

    #[tokio::test]
    async fn test_unreadable_record_is_a_parse_error() {
        let store = create_memory_task_store().unwrap();
        let write_txn = store.db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(TASKS).unwrap();
            table.insert("corrupt", b"{not json".as_slice()).unwrap();
        }
        write_txn.commit().unwrap();

        let err = store.get(&TaskId::new("corrupt")).await.unwrap_err();
        assert!(matches!(err, TraitError::ParseError(_)));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lapsed_claim_is_taken_over() {
        let store = create_memory_task_store().unwrap();
        let id = TaskId::new("stuck");
        store.create(record("stuck", 60)).await.unwrap();
        store.mark_running(&id, DEFAULT_LEASE).await.unwrap();

        assert_eq!(
            store.mark_running(&id, DEFAULT_LEASE).await.unwrap(),
            Transition::Rejected(TaskStatus::Running)
        );
        assert!(store.mark_running(&id, Duration::ZERO).await.unwrap().is_applied());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.redb");
        let id = TaskId::new("durable");

        {
            let store = create_redb_task_store(&path).unwrap();
            store.create(record("durable", 3600)).await.unwrap();
            store.mark_running(&id, DEFAULT_LEASE).await.unwrap();
        }

        let reopened = create_redb_task_store(&path).unwrap();
        let record = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Running);
    }
}
