//! Risk report ⇄ transport record.
//!
//! Every float is canonicalized to [`SIGNIFICANT_DIGITS`] significant digits
//! by rounding the exact binary value in scientific notation (`{:.5e}`) and
//! parsing it back. `-0` becomes `0`. Canonical values are fixed points, so
//! `encode(decode(encode(r))) == encode(r)` and
//! `decode(encode(c)) == c` for any already-canonical report `c`.

use std::collections::BTreeMap;

use tracing::warn;

use stratlab_core::{Estimate, Lambda};
use stratlab_data::NormalizationReport;
use stratlab_risk::{RiskRecord, RiskReport, VolatilityPrior};
use stratlab_traits::error::TraitError;
use stratlab_traits::output::{
    AnalysisResult, PriorSummary, SymbolResult, SCHEMA_VERSION, SIGNIFICANT_DIGITS,
};

/// Round `value` to `digits` significant digits.
///
/// Non-finite input yields `0.0`; callers are expected to have replaced
/// such values upstream.
pub fn canonicalize(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let precision = digits.max(1) - 1;
    let rounded = format!("{value:.precision$e}")
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite())
        .unwrap_or(value);
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Encodes risk reports into [`AnalysisResult`]s and back.
#[derive(Debug, Clone, Copy)]
pub struct ResultCodec {
    digits: usize,
}

impl Default for ResultCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCodec {
    /// Codec at the standard precision.
    pub fn new() -> Self {
        Self {
            digits: SIGNIFICANT_DIGITS,
        }
    }

    fn num(&self, value: f64) -> f64 {
        canonicalize(value, self.digits)
    }

    fn estimate(&self, estimate: Estimate) -> Estimate {
        estimate.map(|v| self.num(v))
    }

    /// Package a report and its normalization diagnostics.
    pub fn encode(&self, report: &RiskReport, diagnostics: &NormalizationReport) -> AnalysisResult {
        let symbols = report
            .records
            .iter()
            .map(|(symbol, record)| (symbol.clone(), self.encode_record(record)))
            .collect();

        AnalysisResult {
            schema_version: SCHEMA_VERSION,
            significant_digits: self.digits,
            benchmark: report.benchmark.clone(),
            benchmark_available: report.benchmark_available,
            confidence_level: self.num(report.confidence_level),
            lambda: self.num(report.lambda.value()),
            prior: self.encode_prior(&report.prior),
            symbols,
            diagnostics: diagnostics.clone(),
        }
    }

    fn encode_record(&self, record: &RiskRecord) -> SymbolResult {
        let fields = [
            record.mean,
            record.volatility,
            record.shrunk_volatility,
            record.var_99,
            record.expected_shortfall_99,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            warn!(symbol = %record.symbol, "non-finite value reached the result codec");
        }

        SymbolResult {
            observations: record.observations,
            mean: self.num(record.mean),
            volatility: self.num(record.volatility),
            shrunk_volatility: self.num(record.shrunk_volatility),
            var_99: self.num(record.var_99),
            expected_shortfall_99: self.num(record.expected_shortfall_99),
            beta: self.estimate(record.beta),
            residual_volatility: self.estimate(record.residual_volatility),
            aligned_observations: record.aligned_observations,
            flags: record.flags.iter().copied().collect(),
        }
    }

    fn encode_prior(&self, prior: &VolatilityPrior) -> PriorSummary {
        match *prior {
            VolatilityPrior::Supplied { value } => PriorSummary::Supplied {
                value: self.num(value),
            },
            VolatilityPrior::CrossSectional { value, symbols } => PriorSummary::CrossSectional {
                value: self.num(value),
                symbols,
            },
            VolatilityPrior::Unavailable => PriorSummary::Unavailable,
        }
    }

    /// Rebuild a report from its transport record.
    pub fn decode(&self, result: &AnalysisResult) -> Result<RiskReport, TraitError> {
        if result.schema_version != SCHEMA_VERSION {
            return Err(TraitError::ParseError(format!(
                "unsupported result schema version {}",
                result.schema_version
            )));
        }
        let lambda = Lambda::new(result.lambda)
            .map_err(|e| TraitError::ParseError(format!("lambda: {e}")))?;

        let records: BTreeMap<_, _> = result
            .symbols
            .iter()
            .map(|(symbol, r)| {
                let record = RiskRecord {
                    symbol: symbol.clone(),
                    observations: r.observations,
                    mean: r.mean,
                    volatility: r.volatility,
                    shrunk_volatility: r.shrunk_volatility,
                    var_99: r.var_99,
                    expected_shortfall_99: r.expected_shortfall_99,
                    beta: r.beta,
                    residual_volatility: r.residual_volatility,
                    aligned_observations: r.aligned_observations,
                    flags: r.flags.iter().copied().collect(),
                };
                (symbol.clone(), record)
            })
            .collect();

        let prior = match result.prior {
            PriorSummary::Supplied { value } => VolatilityPrior::Supplied { value },
            PriorSummary::CrossSectional { value, symbols } => {
                VolatilityPrior::CrossSectional { value, symbols }
            }
            PriorSummary::Unavailable => VolatilityPrior::Unavailable,
        };

        Ok(RiskReport {
            benchmark: result.benchmark.clone(),
            benchmark_available: result.benchmark_available,
            confidence_level: result.confidence_level,
            lambda,
            prior,
            records,
        })
    }
}
