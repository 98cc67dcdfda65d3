//! Normalizer → Risk Engine → Result Codec.

use thiserror::Error;

use stratlab_core::AnalysisRequest;
use stratlab_data::{normalize, ValidationError};
use stratlab_ext_json::ResultCodec;
use stratlab_risk::{RiskEngine, RiskError, Shrinkage};
use stratlab_traits::output::AnalysisResult;
use stratlab_traits::task::{FailureDetail, FailureKind};

use crate::error::EngineError;

/// Caller-facing message for unexpected estimation failures.
pub const COMPUTATION_FAILED_MESSAGE: &str = "risk computation failed; the analysis could not be completed";

/// Why an analysis did not produce a result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The dataset had no usable series
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request itself is inconsistent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Estimation failed
    #[error(transparent)]
    Risk(#[from] RiskError),
}

impl AnalysisError {
    /// The failure detail stored on the task. Estimation errors are reduced
    /// to a fixed message.
    pub fn to_failure(&self) -> FailureDetail {
        match self {
            AnalysisError::Validation(
                e @ (ValidationError::NoUsableData(_) | ValidationError::MissingColumn { .. }),
            ) => FailureDetail::new(FailureKind::NoUsableData, e.to_string()),
            AnalysisError::Validation(e) => {
                FailureDetail::new(FailureKind::InvalidRequest, e.to_string())
            }
            AnalysisError::InvalidRequest(message) => {
                FailureDetail::new(FailureKind::InvalidRequest, message.clone())
            }
            AnalysisError::Risk(_) => {
                FailureDetail::new(FailureKind::ComputationFailed, COMPUTATION_FAILED_MESSAGE)
            }
        }
    }
}

/// CPU-bound analysis executed by a worker.
pub trait Analyzer: Send + Sync {
    /// Run one analysis to completion.
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// The standard analysis: normalize, evaluate, encode.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisPipeline {
    engine: RiskEngine,
    codec: ResultCodec,
}

impl AnalysisPipeline {
    /// Create a pipeline reporting at 99% confidence.
    pub fn new() -> Result<Self, EngineError> {
        let engine = RiskEngine::new().map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self {
            engine,
            codec: ResultCodec::new(),
        })
    }
}

impl Analyzer for AnalysisPipeline {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        request
            .validate()
            .map_err(|e| AnalysisError::InvalidRequest(e.to_string()))?;

        let dataset = normalize(&request.dataset)?;
        let shrinkage = Shrinkage::new(request.lambda).with_prior(request.prior_volatility);
        let report = self
            .engine
            .evaluate_dataset(&dataset, &request.benchmark, shrinkage)?;

        Ok(self.codec.encode(&report, &dataset.report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratlab_core::{RawTable, Symbol};

    fn table() -> RawTable {
        RawTable::new(["date", "ticker", "close"])
            .with_row(vec!["2024-01-01".into(), "AAPL".into(), 100.0.into()])
            .with_row(vec!["2024-01-02".into(), "AAPL".into(), 102.0.into()])
            .with_row(vec!["2024-01-03".into(), "AAPL".into(), 101.0.into()])
            .with_row(vec!["2024-01-01".into(), "SPY".into(), 100.0.into()])
            .with_row(vec!["2024-01-02".into(), "SPY".into(), 101.0.into()])
            .with_row(vec!["2024-01-03".into(), "SPY".into(), 98.98.into()])
    }

    #[test]
    fn test_pipeline_produces_result() {
        let pipeline = AnalysisPipeline::new().unwrap();
        let result = pipeline.analyze(&AnalysisRequest::new(table())).unwrap();

        assert!(result.benchmark_available);
        let spy = result.symbol(&Symbol::new("SPY").unwrap()).unwrap();
        assert_eq!(spy.beta.value(), Some(1.0));
        assert_eq!(result.diagnostics.rows_accepted, 6);
    }

    #[test]
    fn test_missing_column_is_no_usable_data() {
        let pipeline = AnalysisPipeline::new().unwrap();
        let request = AnalysisRequest::new(RawTable::new(["date", "symbol"]));
        let err = pipeline.analyze(&request).unwrap_err();
        assert_eq!(err.to_failure().kind, FailureKind::NoUsableData);
    }

    #[test]
    fn test_computation_failure_hides_detail() {
        let err = AnalysisError::Risk(RiskError::CalculationFailed("matrix 0x7f".into()));
        let failure = err.to_failure();
        assert_eq!(failure.kind, FailureKind::ComputationFailed);
        assert!(!failure.message.contains("0x7f"));
    }
}
