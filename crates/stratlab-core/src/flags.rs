//! Risk flags and omission states.
//!
//! A computed zero and a value that was never computed are different facts.
//! [`Estimate`] keeps them apart, and [`RiskFlag`] records why a placeholder
//! or omission was produced.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition attached to a per-symbol risk record.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    /// Zero variance or fewer than two returns; VaR/ES reported as 0
    Degenerate,
    /// A non-finite intermediate was intercepted and replaced
    NonFiniteReplaced,
    /// Volatility was blended toward a prior
    Shrunk,
    /// Shrinkage was requested but no prior could be formed
    PriorUnavailable,
    /// Benchmark series absent; regression outputs omitted
    BenchmarkUnavailable,
    /// Fewer than two date-aligned observations with the benchmark
    InsufficientData,
    /// Benchmark returns have zero variance over the aligned window
    ZeroBenchmarkVariance,
}

impl RiskFlag {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::Degenerate => "degenerate",
            RiskFlag::NonFiniteReplaced => "non_finite_replaced",
            RiskFlag::Shrunk => "shrunk",
            RiskFlag::PriorUnavailable => "prior_unavailable",
            RiskFlag::BenchmarkUnavailable => "benchmark_unavailable",
            RiskFlag::InsufficientData => "insufficient_data",
            RiskFlag::ZeroBenchmarkVariance => "zero_benchmark_variance",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an estimate was not computed.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmissionReason {
    /// The benchmark symbol has no usable series
    BenchmarkUnavailable,
    /// Fewer than two date-aligned observations
    InsufficientData,
    /// Benchmark variance is zero, so beta is undefined
    ZeroBenchmarkVariance,
    /// The computation produced NaN or infinity
    NonFinite,
}

impl OmissionReason {
    /// The flag that accompanies this omission on a risk record.
    pub fn flag(&self) -> RiskFlag {
        match self {
            OmissionReason::BenchmarkUnavailable => RiskFlag::BenchmarkUnavailable,
            OmissionReason::InsufficientData => RiskFlag::InsufficientData,
            OmissionReason::ZeroBenchmarkVariance => RiskFlag::ZeroBenchmarkVariance,
            OmissionReason::NonFinite => RiskFlag::NonFiniteReplaced,
        }
    }
}

/// A value that is either computed or explicitly omitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Estimate {
    /// Computed value
    Computed {
        /// The estimate
        value: f64,
    },
    /// Not computed, with the reason
    Omitted {
        /// Why the value is absent
        reason: OmissionReason,
    },
}

impl Estimate {
    /// A computed value. Non-finite inputs become an omission.
    pub fn computed(value: f64) -> Self {
        if value.is_finite() {
            Estimate::Computed { value }
        } else {
            Estimate::Omitted {
                reason: OmissionReason::NonFinite,
            }
        }
    }

    /// An omitted value.
    pub fn omitted(reason: OmissionReason) -> Self {
        Estimate::Omitted { reason }
    }

    /// The value, if computed.
    pub fn value(&self) -> Option<f64> {
        match self {
            Estimate::Computed { value } => Some(*value),
            Estimate::Omitted { .. } => None,
        }
    }

    /// The omission reason, if omitted.
    pub fn omission(&self) -> Option<OmissionReason> {
        match self {
            Estimate::Computed { .. } => None,
            Estimate::Omitted { reason } => Some(*reason),
        }
    }

    /// Whether the value was computed.
    pub fn is_computed(&self) -> bool {
        matches!(self, Estimate::Computed { .. })
    }

    /// Apply `f` to a computed value, keeping omissions as they are.
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Estimate::Computed { value } => Estimate::computed(f(value)),
            omitted => omitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_non_finite_is_omitted() {
        assert_eq!(
            Estimate::computed(f64::NAN).omission(),
            Some(OmissionReason::NonFinite)
        );
        assert_eq!(Estimate::computed(0.0).value(), Some(0.0));
    }

    #[test]
    fn test_estimate_wire_shape() {
        let computed = serde_json::to_value(Estimate::computed(1.25)).unwrap();
        assert_eq!(computed["state"], "computed");
        assert_eq!(computed["value"], 1.25);

        let omitted =
            serde_json::to_value(Estimate::omitted(OmissionReason::BenchmarkUnavailable)).unwrap();
        assert_eq!(omitted["state"], "omitted");
        assert_eq!(omitted["reason"], "benchmark_unavailable");
    }

    #[test]
    fn test_flag_names_match_serde() {
        for flag in [
            RiskFlag::Degenerate,
            RiskFlag::NonFiniteReplaced,
            RiskFlag::Shrunk,
            RiskFlag::PriorUnavailable,
            RiskFlag::BenchmarkUnavailable,
            RiskFlag::InsufficientData,
            RiskFlag::ZeroBenchmarkVariance,
        ] {
            let json = serde_json::to_value(flag).unwrap();
            assert_eq!(json, flag.as_str());
        }
    }

    #[test]
    fn test_omission_flags() {
        assert_eq!(
            OmissionReason::InsufficientData.flag(),
            RiskFlag::InsufficientData
        );
        assert_eq!(OmissionReason::NonFinite.flag(), RiskFlag::NonFiniteReplaced);
    }
}
