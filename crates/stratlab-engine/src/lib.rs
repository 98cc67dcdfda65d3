//! # StratLab Engine
//!
//! Asynchronous task orchestration for risk analyses.
//!
//! A caller submits an [`AnalysisRequest`](stratlab_core::AnalysisRequest)
//! and receives a task id immediately. Workers pull the request from a
//! [`TaskQueue`], run Normalizer → Risk Engine → Result Codec on the blocking
//! pool, and write the terminal state into a [`TaskStore`] exactly once. The
//! caller polls until the task is terminal and then fetches the outcome.
//!
//! ```text
//! submit ──► store.create (PENDING) ──► queue.enqueue
//!                                           │
//!   worker ◄────────────────────────────────┘
//!     store.mark_running (RUNNING)
//!     spawn_blocking(analyze)
//!     store.complete (SUCCESS | FAILURE)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let engine = AnalysisEngineBuilder::new()
//!     .with_config(EngineConfig::default().with_workers(4))
//!     .build()?;
//! engine.start();
//!
//! let submission = engine.submit(request, None).await?;
//! let snapshot = engine.poll(&submission.task_id).await?;
//! ```
//!
//! [`TaskQueue`]: stratlab_traits::TaskQueue
//! [`TaskStore`]: stratlab_traits::TaskStore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;
pub mod runtime;
pub mod worker;

use std::sync::Arc;

use tracing::info;

use stratlab_core::{AnalysisRequest, IdempotencyKey, TaskId};
use stratlab_traits::queue::TaskQueue;
use stratlab_traits::store::TaskStore;
use stratlab_traits::task::{TaskOutcome, TaskSnapshot};

pub use builder::AnalysisEngineBuilder;
pub use config::EngineConfig;
pub use error::EngineError;
pub use memory::{InMemoryTaskQueue, InMemoryTaskStore};
pub use orchestrator::{Submission, TaskOrchestrator};
pub use pipeline::{AnalysisError, AnalysisPipeline, Analyzer};
pub use runtime::{Backoff, RetryConfig};
pub use worker::{Disposition, Worker, WorkerPool};

/// Orchestrator and worker pool sharing one store and one queue.
pub struct AnalysisEngine {
    config: EngineConfig,
    orchestrator: TaskOrchestrator,
    pool: WorkerPool,
    store: Arc<dyn TaskStore>,
}

impl AnalysisEngine {
    /// Wire an engine from its parts. Prefer [`AnalysisEngineBuilder`].
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let orchestrator = TaskOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            config.result_ttl,
            config.retry.clone(),
        );
        let worker = Worker::new(Arc::clone(&store), analyzer, config.retry.clone())
            .with_lease(config.lease);
        let pool = WorkerPool::new(
            worker,
            queue,
            Arc::clone(&store),
            config.workers,
            config.purge_interval,
        );

        Self {
            config,
            orchestrator,
            pool,
            store,
        }
    }

    /// Start the worker pool.
    pub fn start(&self) {
        info!("Starting analysis engine: {}", self.config.name);
        self.pool.start();
    }

    /// Stop the worker pool after in-flight tasks finish.
    pub async fn shutdown(&self) {
        info!("Shutting down analysis engine");
        self.pool.shutdown().await;
        info!("Analysis engine shutdown complete");
    }

    /// Submit a request. See [`TaskOrchestrator::submit`].
    pub async fn submit(
        &self,
        request: AnalysisRequest,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Submission, EngineError> {
        self.orchestrator.submit(request, idempotency_key).await
    }

    /// Poll a task. See [`TaskOrchestrator::poll`].
    pub async fn poll(&self, task_id: &TaskId) -> Result<TaskSnapshot, EngineError> {
        self.orchestrator.poll(task_id).await
    }

    /// Fetch a terminal outcome. See [`TaskOrchestrator::fetch_result`].
    pub async fn fetch_result(&self, task_id: &TaskId) -> Result<TaskOutcome, EngineError> {
        self.orchestrator.fetch_result(task_id).await
    }

    /// Get the orchestrator.
    pub fn orchestrator(&self) -> &TaskOrchestrator {
        &self.orchestrator
    }

    /// Get the worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Get the result store.
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
