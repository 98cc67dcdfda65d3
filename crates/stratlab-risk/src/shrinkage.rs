//! Volatility shrinkage toward a prior.
//!
//! `σ_used = (1 - λ)·σ + λ·σ̄`, where `σ̄` is either supplied by the caller
//! or the cross-sectional mean volatility of the non-degenerate symbols in
//! the same dataset.

use serde::{Deserialize, Serialize};
use stratlab_core::Lambda;

/// Minimum number of non-degenerate symbols for a cross-sectional prior.
pub const MIN_PRIOR_SYMBOLS: usize = 2;

/// Shrinkage settings for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shrinkage {
    /// Blend weight toward the prior
    pub lambda: Lambda,
    /// Caller-supplied prior volatility
    pub prior: Option<f64>,
}

impl Shrinkage {
    /// No shrinkage (`λ = 0`).
    pub fn none() -> Self {
        Self::default()
    }

    /// Shrink with weight `lambda` toward a cross-sectional prior.
    pub fn new(lambda: Lambda) -> Self {
        Self {
            lambda,
            prior: None,
        }
    }

    /// Use a fixed prior instead of the cross-sectional one.
    pub fn with_prior(mut self, prior: Option<f64>) -> Self {
        self.prior = prior;
        self
    }

    /// Whether shrinkage has any effect.
    pub fn is_active(&self) -> bool {
        !self.lambda.is_zero()
    }
}

/// Where the prior volatility came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VolatilityPrior {
    /// Supplied by the caller
    Supplied {
        /// Prior volatility
        value: f64,
    },
    /// Mean volatility across the dataset
    CrossSectional {
        /// Prior volatility
        value: f64,
        /// Number of symbols averaged
        symbols: usize,
    },
    /// No usable prior
    Unavailable,
}

impl VolatilityPrior {
    /// Resolve the prior for a set of per-symbol volatilities.
    ///
    /// `volatilities` must only contain non-degenerate estimates, in a
    /// stable order.
    pub fn resolve(supplied: Option<f64>, volatilities: &[f64]) -> Self {
        if let Some(value) = supplied.filter(|v| v.is_finite() && *v >= 0.0) {
            return Self::Supplied { value };
        }
        if volatilities.len() < MIN_PRIOR_SYMBOLS {
            return Self::Unavailable;
        }
        let value = crate::stats::mean(volatilities);
        if value.is_finite() {
            Self::CrossSectional {
                value,
                symbols: volatilities.len(),
            }
        } else {
            Self::Unavailable
        }
    }

    /// The prior value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Supplied { value } | Self::CrossSectional { value, .. } => Some(*value),
            Self::Unavailable => None,
        }
    }
}

/// Blend `sigma` toward `prior` with weight `lambda`.
pub fn shrink(sigma: f64, lambda: Lambda, prior: f64) -> f64 {
    let l = lambda.value();
    (1.0 - l) * sigma + l * prior
}
