//! CAPM beta and residual volatility.
//!
//! Regresses a symbol's returns on the benchmark's returns over the
//! intersection of their dates:
//!
//! ```text
//! β = Cov(r_s, r_b) / Var(r_b)
//! α = mean(r_s) - β·mean(r_b)
//! ε_t = r_s,t - α - β·r_b,t
//! ```
//!
//! Residual volatility is the sample (`ddof = 1`) standard deviation of `ε`.

use crate::stats::{covariance, mean, std_dev, variance};
use serde::{Deserialize, Serialize};
use stratlab_core::{Estimate, OmissionReason};
use stratlab_data::AlignedPair;

/// Minimum number of date-aligned observations for a regression.
pub const MIN_ALIGNED_OBSERVATIONS: usize = 2;

/// Outcome of a single-factor regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapmRegression {
    /// Slope against the benchmark
    pub beta: Estimate,
    /// Standard deviation of the regression residuals
    pub residual_volatility: Estimate,
    /// Number of date-aligned observations used
    pub observations: usize,
}

impl CapmRegression {
    /// Both estimates omitted for the same reason.
    pub fn omitted(reason: OmissionReason, observations: usize) -> Self {
        Self {
            beta: Estimate::omitted(reason),
            residual_volatility: Estimate::omitted(reason),
            observations,
        }
    }

    /// Regress the left series of `pair` on the right (benchmark) series.
    pub fn fit(pair: &AlignedPair) -> Self {
        let n = pair.len();
        if n < MIN_ALIGNED_OBSERVATIONS {
            return Self::omitted(OmissionReason::InsufficientData, n);
        }
        Self::fit_slices(&pair.left, &pair.right)
    }

    /// Regress `asset` on `benchmark`. Slices must be date-aligned.
    pub fn fit_slices(asset: &[f64], benchmark: &[f64]) -> Self {
        let n = asset.len().min(benchmark.len());
        let (Some(var_b), Some(cov)) = (variance(benchmark), covariance(asset, benchmark)) else {
            return Self::omitted(OmissionReason::InsufficientData, n);
        };

        if !var_b.is_finite() || !cov.is_finite() {
            return Self::omitted(OmissionReason::NonFinite, n);
        }
        if var_b <= 0.0 {
            return Self::omitted(OmissionReason::ZeroBenchmarkVariance, n);
        }

        let beta = cov / var_b;
        let alpha = mean(asset) - beta * mean(benchmark);
        let residuals: Vec<f64> = asset
            .iter()
            .zip(benchmark)
            .map(|(s, b)| s - alpha - beta * b)
            .collect();

        let residual_volatility = match std_dev(&residuals) {
            Some(v) => Estimate::computed(v),
            None => Estimate::omitted(OmissionReason::InsufficientData),
        };

        Self {
            beta: Estimate::computed(beta),
            residual_volatility,
            observations: n,
        }
    }
}
