//! Value at Risk (VaR) and Expected Shortfall (ES) calculations.
//!
//! Both measures are expressed as positive loss magnitudes in return
//! units over a single period. A profitable tail floors to zero.

mod parametric;

pub use parametric::*;

use serde::{Deserialize, Serialize};

/// Confidence level used for all reported tail measures.
pub const CONFIDENCE_99: f64 = 0.99;

/// Tail risk result for a single return distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailRisk {
    /// Value at Risk (non-negative loss)
    pub var: f64,
    /// Expected Shortfall (non-negative loss, never below `var`)
    pub expected_shortfall: f64,
    /// Confidence level (e.g., 0.99 for 99%)
    pub confidence_level: f64,
}

impl TailRisk {
    /// A zero-loss placeholder at the given confidence.
    pub fn zero(confidence_level: f64) -> Self {
        Self {
            var: 0.0,
            expected_shortfall: 0.0,
            confidence_level,
        }
    }
}

impl std::fmt::Display for TailRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VaR({:.0}%): {:.6}, ES: {:.6}",
            self.confidence_level * 100.0,
            self.var,
            self.expected_shortfall
        )
    }
}
