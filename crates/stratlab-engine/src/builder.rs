//! Builder pattern for the analysis engine.

use std::sync::Arc;

use tracing::debug;

use stratlab_traits::queue::TaskQueue;
use stratlab_traits::store::TaskStore;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::memory::{InMemoryTaskQueue, InMemoryTaskStore};
use crate::pipeline::{AnalysisPipeline, Analyzer};
use crate::AnalysisEngine;

/// Builder for constructing an [`AnalysisEngine`].
pub struct AnalysisEngineBuilder {
    config: Option<EngineConfig>,
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    analyzer: Option<Arc<dyn Analyzer>>,
}

impl AnalysisEngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            queue: None,
            analyzer: None,
        }
    }

    /// Set the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the result store.
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the message broker.
    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Replace the standard analysis pipeline.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Build the engine. Missing store and queue default to in-process ones.
    pub fn build(self) -> Result<AnalysisEngine, EngineError> {
        let config = self.config.unwrap_or_default();
        if config.workers == 0 {
            return Err(EngineError::ConfigError(
                "worker count must be at least 1".into(),
            ));
        }
        if config.result_ttl.is_zero() {
            return Err(EngineError::ConfigError(
                "result ttl must be at least one second".into(),
            ));
        }

        let store = self.store.unwrap_or_else(|| {
            debug!("no result store configured, using in-memory store");
            Arc::new(InMemoryTaskStore::new())
        });
        let queue = self.queue.unwrap_or_else(|| {
            debug!("no broker configured, using in-memory queue");
            Arc::new(InMemoryTaskQueue::new())
        });
        let analyzer = match self.analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(AnalysisPipeline::new()?),
        };

        Ok(AnalysisEngine::new(config, store, queue, analyzer))
    }
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
