//! Transport-safe analysis results.
//!
//! These are the records returned to callers and persisted by result stores.
//! All floats are finite; omitted estimates carry an explicit state so a
//! computed zero never looks like a missing value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stratlab_core::{Estimate, RiskFlag, Symbol};
use stratlab_data::NormalizationReport;

/// Version of the [`AnalysisResult`] layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Significant digits retained by numeric fields.
pub const SIGNIFICANT_DIGITS: usize = 6;

/// Packaged output of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Layout version
    pub schema_version: u32,
    /// Significant digits of every numeric field
    pub significant_digits: usize,
    /// Benchmark used for beta
    pub benchmark: Symbol,
    /// Whether the benchmark had a usable series
    pub benchmark_available: bool,
    /// Confidence level of VaR and ES
    pub confidence_level: f64,
    /// Shrinkage weight applied
    pub lambda: f64,
    /// Prior volatility used for shrinkage
    pub prior: PriorSummary,
    /// Per-symbol measures, ordered by symbol
    pub symbols: BTreeMap<Symbol, SymbolResult>,
    /// Normalization bookkeeping
    pub diagnostics: NormalizationReport,
}

impl AnalysisResult {
    /// Measures for one symbol.
    pub fn symbol(&self, symbol: &Symbol) -> Option<&SymbolResult> {
        self.symbols.get(symbol)
    }
}

/// Prior volatility as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PriorSummary {
    /// Supplied with the request
    Supplied {
        /// Prior volatility
        value: f64,
    },
    /// Mean volatility across the dataset
    CrossSectional {
        /// Prior volatility
        value: f64,
        /// Symbols averaged
        symbols: usize,
    },
    /// No prior could be formed
    Unavailable,
}

/// Risk measures for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolResult {
    /// Number of returns
    pub observations: usize,
    /// Mean return
    pub mean: f64,
    /// Sample volatility
    pub volatility: f64,
    /// Volatility after shrinkage
    pub shrunk_volatility: f64,
    /// 99% Value at Risk
    pub var_99: f64,
    /// 99% Expected Shortfall
    pub expected_shortfall_99: f64,
    /// CAPM beta
    pub beta: Estimate,
    /// Residual volatility of the CAPM regression
    pub residual_volatility: Estimate,
    /// Observations shared with the benchmark
    pub aligned_observations: usize,
    /// Conditions attached to this record, sorted
    pub flags: Vec<RiskFlag>,
}
