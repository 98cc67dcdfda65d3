//! Gaussian parametric VaR and ES.

use super::TailRisk;
use crate::error::RiskError;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Gaussian tail quantities for a fixed confidence level.
///
/// With `α = 1 - confidence` and `z = Φ⁻¹(α)`:
///
/// ```text
/// VaR = max(0, -(μ + z·σ))
/// ES  = max(0, -(μ - σ·φ(z)/α))
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianTail {
    confidence_level: f64,
    z: f64,
    shortfall_multiplier: f64,
}

impl GaussianTail {
    /// Build the tail constants for `confidence_level` in (0, 1).
    pub fn new(confidence_level: f64) -> Result<Self, RiskError> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(RiskError::InvalidInput(format!(
                "confidence level must be between 0 and 1, got {confidence_level}"
            )));
        }

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| RiskError::CalculationFailed(format!("standard normal: {e}")))?;
        let alpha = 1.0 - confidence_level;
        let z = normal.inverse_cdf(alpha);
        let shortfall_multiplier = normal.pdf(z) / alpha;

        Ok(Self {
            confidence_level,
            z,
            shortfall_multiplier,
        })
    }

    /// Tail constants at 99%.
    pub fn ninety_nine() -> Result<Self, RiskError> {
        Self::new(super::CONFIDENCE_99)
    }

    /// Lower-tail standard normal quantile `Φ⁻¹(1 - confidence)`.
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Confidence level.
    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// VaR and ES for a distribution with mean `mean` and volatility `sigma`.
    ///
    /// Non-finite intermediate results are returned as-is; callers decide
    /// how to replace them.
    pub fn evaluate(&self, mean: f64, sigma: f64) -> TailRisk {
        let var = -(mean + self.z * sigma);
        let es = -(mean - sigma * self.shortfall_multiplier);

        TailRisk {
            var: floor_at_zero(var),
            expected_shortfall: floor_at_zero(es),
            confidence_level: self.confidence_level,
        }
    }
}

fn floor_at_zero(loss: f64) -> f64 {
    // NaN passes through so it can be flagged upstream.
    if loss < 0.0 {
        0.0
    } else {
        loss
    }
}
