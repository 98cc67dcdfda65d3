//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use stratlab_core::{Lambda, Symbol};
use stratlab_traits::task::DEFAULT_LEASE;

use crate::runtime::RetryConfig;

/// Default result retention: one day.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(86_400);

/// Task orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine name/identifier
    pub name: String,

    /// Benchmark used when a request does not name one
    pub default_benchmark: Symbol,

    /// Shrinkage weight used when a request does not set one
    pub default_lambda: Lambda,

    /// Retention of task records and results
    pub result_ttl: Duration,

    /// Number of concurrent workers
    pub workers: usize,

    /// Interval between expired-record sweeps
    pub purge_interval: Duration,

    /// Age after which a RUNNING claim may be taken over by a redelivery
    pub lease: Duration,

    /// Retry policy for broker and store operations
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "stratlab-engine".to_string(),
            default_benchmark: Symbol::default_benchmark(),
            default_lambda: Lambda::ZERO,
            result_ttl: DEFAULT_RESULT_TTL,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            purge_interval: Duration::from_secs(60),
            lease: DEFAULT_LEASE,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the result retention.
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Set the claim lease.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
