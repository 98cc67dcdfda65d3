//! Retry policy for broker and store calls.
//!
//! Only [`TraitError::is_transient`] failures are retried. Delays grow
//! geometrically from `initial_delay`, are capped at `max_delay`, and with
//! `jitter` each one is spread over `[delay / 2, delay]` so workers that
//! failed together do not retry in lockstep.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use stratlab_traits::error::TraitError;

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Spread delays randomly.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Try once and never wait.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delays to sleep between attempts; yields `max_attempts - 1` items.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_delay.min(self.max_delay),
            max: self.max_delay,
            multiplier: self.backoff_multiplier.max(1.0),
            remaining: self.max_attempts.saturating_sub(1),
            spread: self.jitter.then(Spread::from_clock),
        }
    }

    /// Run `op`, retrying transient failures. `operation` names the call in
    /// logs.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, TraitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TraitError>>,
    {
        let mut delays = self.backoff();
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };
            let Some(delay) = delays.next() else {
                warn!(operation, attempt, error = %err, "giving up");
                return Err(err);
            };
            debug!(operation, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Iterator over retry delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    remaining: u32,
    spread: Option<Spread>,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next;
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .map_or(self.max, |d| d.min(self.max));
        Some(match self.spread.as_mut() {
            Some(spread) => base / 2 + base.mul_f64(spread.unit() / 2.0),
            None => base,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

/// xorshift64 sequence seeded from the clock.
#[derive(Debug, Clone)]
struct Spread(u64);

impl Spread {
    fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos | 1)
    }

    /// Next value in `[0, 1)`.
    fn unit(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}
