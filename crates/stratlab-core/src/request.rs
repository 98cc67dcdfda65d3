//! Analysis requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::Symbol;
use crate::table::RawTable;

/// Benchmark symbol used when the caller does not name one.
pub const DEFAULT_BENCHMARK: &str = "SPY";

/// Shrinkage blending factor, guaranteed to lie in `[0, 1]`.
///
/// `σ_shrunk = (1 - λ)·σ + λ·σ̄`. Zero keeps the sample estimate, one
/// replaces it with the prior.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Lambda(f64);

impl Lambda {
    /// No shrinkage.
    pub const ZERO: Lambda = Lambda(0.0);

    /// Create a validated shrinkage factor.
    pub fn new(value: f64) -> CoreResult<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(CoreError::InvalidLambda(value));
        }
        Ok(Self(value))
    }

    /// The raw factor.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether this factor leaves estimates untouched.
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl TryFrom<f64> for Lambda {
    type Error = CoreError;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<Lambda> for f64 {
    fn from(l: Lambda) -> Self {
        l.0
    }
}

/// A request to analyse one uploaded dataset.
///
/// Requests are immutable once submitted; the orchestrator hands workers a
/// shared, read-only copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Uploaded table
    pub dataset: RawTable,
    /// Shrinkage factor for volatility
    pub lambda: Lambda,
    /// Benchmark for the CAPM regression
    pub benchmark: Symbol,
    /// Caller-supplied volatility prior for shrinkage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_volatility: Option<f64>,
    /// Result retention override, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ttl_secs: Option<u64>,
}

impl AnalysisRequest {
    /// Create a request with default benchmark and no shrinkage.
    pub fn new(dataset: RawTable) -> Self {
        Self {
            dataset,
            lambda: Lambda::ZERO,
            benchmark: Symbol::default_benchmark(),
            prior_volatility: None,
            result_ttl_secs: None,
        }
    }

    /// Set the shrinkage factor.
    pub fn with_lambda(mut self, lambda: Lambda) -> Self {
        self.lambda = lambda;
        self
    }

    /// Set the benchmark symbol.
    pub fn with_benchmark(mut self, benchmark: Symbol) -> Self {
        self.benchmark = benchmark;
        self
    }

    /// Set the volatility prior.
    pub fn with_prior_volatility(mut self, prior: f64) -> CoreResult<Self> {
        if !prior.is_finite() || prior < 0.0 {
            return Err(CoreError::InvalidPrior(prior));
        }
        self.prior_volatility = Some(prior);
        Ok(self)
    }

    /// Override how long the result is retained.
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl_secs = Some(ttl.as_secs());
        self
    }

    /// Retention override, if any.
    pub fn result_ttl(&self) -> Option<Duration> {
        self.result_ttl_secs.map(Duration::from_secs)
    }

    /// Check invariants that deserialization alone cannot enforce.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(prior) = self.prior_volatility {
            if !prior.is_finite() || prior < 0.0 {
                return Err(CoreError::InvalidPrior(prior));
            }
        }
        if self.result_ttl_secs == Some(0) {
            return Err(CoreError::InvalidTtl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lambda_bounds() {
        assert!(Lambda::new(0.0).is_ok());
        assert!(Lambda::new(1.0).is_ok());
        assert_eq!(Lambda::new(1.5), Err(CoreError::InvalidLambda(1.5)));
        assert!(Lambda::new(-0.1).is_err());
        assert!(Lambda::new(f64::NAN).is_err());
    }

    #[test]
    fn test_lambda_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<Lambda>("0.25").is_ok());
        assert!(serde_json::from_str::<Lambda>("2.0").is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = AnalysisRequest::new(RawTable::default());
        assert_eq!(request.benchmark.as_str(), DEFAULT_BENCHMARK);
        assert!(request.lambda.is_zero());
        assert!(request.result_ttl().is_none());
    }

    #[test]
    fn test_prior_validation() {
        let request = AnalysisRequest::new(RawTable::default());
        assert!(request.clone().with_prior_volatility(0.02).is_ok());
        assert!(request.with_prior_volatility(-1.0).is_err());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let request = AnalysisRequest::new(RawTable::default());
        assert!(request.clone().with_result_ttl(Duration::from_secs(1)).validate().is_ok());
        assert_eq!(
            request.with_result_ttl(Duration::ZERO).validate(),
            Err(CoreError::InvalidTtl)
        );
    }
}
