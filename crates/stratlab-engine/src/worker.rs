//! Worker boundary and pool.
//!
//! A worker takes a [`TaskMessage`], claims the task through the store
//! (PENDING → RUNNING), runs the analysis on the blocking pool and writes the
//! terminal state once. Redelivered messages find the task already claimed
//! or terminal and are dropped without touching the stored result, unless
//! the claim is older than the worker's lease, in which case the delivery
//! takes the task over. Errors and panics inside the analysis become a
//! FAILURE; they never escape the worker loop. A result the store refuses
//! to write is replaced by a FAILURE so the task does not stay RUNNING.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use stratlab_core::TaskId;
use stratlab_traits::error::TraitError;
use stratlab_traits::queue::{TaskMessage, TaskQueue};
use stratlab_traits::store::TaskStore;
use stratlab_traits::task::{
    FailureDetail, FailureKind, TaskOutcome, TaskStatus, Transition, DEFAULT_LEASE,
};

use crate::error::EngineError;
use crate::pipeline::{Analyzer, COMPUTATION_FAILED_MESSAGE};
use crate::runtime::RetryConfig;

/// Failure recorded when a computed result cannot be written.
pub const RESULT_NOT_STORED_MESSAGE: &str = "the analysis result could not be stored";

/// What a worker did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The task was executed and reached this terminal state
    Completed(TaskStatus),
    /// Another worker already claimed the task
    AlreadyRunning,
    /// The task was already terminal; nothing was written
    AlreadyTerminal,
    /// The task is unknown or has expired
    Missing,
}

/// Executes tasks against a store.
#[derive(Clone)]
pub struct Worker {
    store: Arc<dyn TaskStore>,
    analyzer: Arc<dyn Analyzer>,
    retry: RetryConfig,
    lease: Duration,
}

impl Worker {
    /// Create a worker holding claims for [`DEFAULT_LEASE`].
    pub fn new(store: Arc<dyn TaskStore>, analyzer: Arc<dyn Analyzer>, retry: RetryConfig) -> Self {
        Self {
            store,
            analyzer,
            retry,
            lease: DEFAULT_LEASE,
        }
    }

    /// Set how long a RUNNING claim blocks other deliveries.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Process one delivery of a message.
    ///
    /// Only store failures that outlast the retry policy are returned as
    /// errors; analysis failures are written to the task.
    pub async fn process(&self, message: TaskMessage) -> Result<Disposition, EngineError> {
        let task_id = &message.task_id;

        let claimed = self
            .retry
            .run("claim task", || self.store.mark_running(task_id, self.lease))
            .await;
        match claimed {
            Ok(Transition::Applied) => {}
            Ok(Transition::Rejected(status)) if status.is_terminal() => {
                debug!(task_id = %task_id, delivery = message.delivery, "task already terminal, skipping");
                return Ok(Disposition::AlreadyTerminal);
            }
            Ok(Transition::Rejected(_)) => {
                debug!(task_id = %task_id, delivery = message.delivery, "task already claimed, skipping");
                return Ok(Disposition::AlreadyRunning);
            }
            Err(TraitError::NotFound(_)) => {
                warn!(task_id = %task_id, "task missing or expired, dropping message");
                return Ok(Disposition::Missing);
            }
            Err(e) => return Err(e.into()),
        }
        info!(task_id = %task_id, "task running");

        let outcome = self.execute(task_id, &message).await;
        self.record(task_id, outcome).await
    }

    async fn record(&self, task_id: &TaskId, outcome: TaskOutcome) -> Result<Disposition, EngineError> {
        let status = outcome.status();
        let written = self.write_outcome(task_id, &outcome).await;

        match written {
            Ok(Transition::Applied) => {
                info!(task_id = %task_id, status = %status, "task finished");
                Ok(Disposition::Completed(status))
            }
            Ok(Transition::Rejected(current)) => {
                warn!(task_id = %task_id, current = %current, "terminal state already written");
                Ok(Disposition::AlreadyTerminal)
            }
            Err(TraitError::NotFound(_)) => {
                warn!(task_id = %task_id, "task expired before its result was written");
                Ok(Disposition::Missing)
            }
            Err(e) if status == TaskStatus::Success => {
                error!(task_id = %task_id, error = %e, "failed to record result, recording failure instead");
                let fallback = TaskOutcome::Failure {
                    error: FailureDetail::new(
                        FailureKind::ComputationFailed,
                        RESULT_NOT_STORED_MESSAGE,
                    ),
                };
                match self.write_outcome(task_id, &fallback).await {
                    Ok(Transition::Applied) => Ok(Disposition::Completed(TaskStatus::Failure)),
                    Ok(Transition::Rejected(_)) => Ok(Disposition::AlreadyTerminal),
                    Err(TraitError::NotFound(_)) => Ok(Disposition::Missing),
                    Err(_) => Err(e.into()),
                }
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "failed to record task outcome");
                Err(e.into())
            }
        }
    }

    async fn write_outcome(
        &self,
        task_id: &TaskId,
        outcome: &TaskOutcome,
    ) -> Result<Transition, TraitError> {
        self.retry
            .run("record outcome", || self.store.complete(task_id, outcome.clone()))
            .await
    }

    async fn execute(&self, task_id: &TaskId, message: &TaskMessage) -> TaskOutcome {
        let analyzer = Arc::clone(&self.analyzer);
        let request = Arc::clone(&message.request);

        match tokio::task::spawn_blocking(move || analyzer.analyze(&request)).await {
            Ok(Ok(result)) => TaskOutcome::Success { result },
            Ok(Err(e)) => {
                let error = e.to_failure();
                match error.kind {
                    FailureKind::ComputationFailed => {
                        error!(task_id = %task_id, error = %e, "analysis failed")
                    }
                    _ => warn!(task_id = %task_id, error = %e, "analysis rejected input"),
                }
                TaskOutcome::Failure { error }
            }
            Err(join_error) => {
                error!(task_id = %task_id, error = %join_error, "analysis panicked");
                TaskOutcome::Failure {
                    error: FailureDetail::new(
                        FailureKind::ComputationFailed,
                        COMPUTATION_FAILED_MESSAGE,
                    ),
                }
            }
        }
    }
}

/// A fixed set of workers draining one queue, plus a purge loop.
pub struct WorkerPool {
    worker: Worker,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn TaskStore>,
    workers: usize,
    purge_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a stopped pool.
    pub fn new(
        worker: Worker,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn TaskStore>,
        workers: usize,
        purge_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            worker,
            queue,
            store,
            workers: workers.max(1),
            purge_interval,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker loops and the purge loop.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("worker pool already started");
            return;
        }

        for index in 0..self.workers {
            handles.push(self.spawn_worker(index));
        }
        handles.push(self.spawn_purge_loop());
        info!(workers = self.workers, "worker pool started");
    }

    fn spawn_worker(&self, index: usize) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let queue = Arc::clone(&self.queue);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(worker = index, "worker shutting down");
                        break;
                    }
                    next = queue.dequeue() => match next {
                        Ok(Some(message)) => {
                            if let Err(e) = worker.process(message).await {
                                error!(worker = index, error = %e, "worker failed to process message");
                            }
                        }
                        Ok(None) => {
                            debug!(worker = index, "queue closed");
                            break;
                        }
                        Err(e) => {
                            warn!(worker = index, error = %e, "dequeue failed");
                            sleep(Duration::from_millis(250)).await;
                        }
                    },
                }
            }
        })
    }

    fn spawn_purge_loop(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.purge_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.purge_expired().await {
                            warn!(error = %e, "purge of expired tasks failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("purge loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Signal all loops to stop and wait for them. In-flight analyses run to
    /// completion first.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }

    /// Whether the loops are running.
    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }
}
