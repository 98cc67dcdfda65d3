//! Per-symbol risk evaluation.
//!
//! [`RiskEngine::evaluate`] runs in two parallel passes over the series map:
//! moments first (they feed the cross-sectional prior), then the full record
//! for each symbol. Symbols are independent within a pass; results are
//! collected into a `BTreeMap`, so output order never depends on scheduling.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stratlab_core::{Estimate, Lambda, OmissionReason, RiskFlag, Symbol};
use stratlab_data::{NormalizedDataset, ReturnSeries};

use crate::beta::CapmRegression;
use crate::error::RiskError;
use crate::shrinkage::{shrink, Shrinkage, VolatilityPrior};
use crate::stats::Moments;
use crate::var::{GaussianTail, TailRisk};

/// Risk measures for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    /// The symbol
    pub symbol: Symbol,
    /// Number of returns
    pub observations: usize,
    /// Mean return
    pub mean: f64,
    /// Sample volatility before shrinkage
    pub volatility: f64,
    /// Volatility used for VaR/ES
    pub shrunk_volatility: f64,
    /// 99% Value at Risk
    pub var_99: f64,
    /// 99% Expected Shortfall
    pub expected_shortfall_99: f64,
    /// CAPM beta against the benchmark
    pub beta: Estimate,
    /// Residual volatility of the CAPM regression
    pub residual_volatility: Estimate,
    /// Date-aligned observations shared with the benchmark
    pub aligned_observations: usize,
    /// Conditions attached to this record
    pub flags: BTreeSet<RiskFlag>,
}

impl RiskRecord {
    /// Whether a flag is set.
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Risk measures for every symbol in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// Benchmark used for beta
    pub benchmark: Symbol,
    /// Whether the benchmark had a usable series
    pub benchmark_available: bool,
    /// Confidence level of the tail measures
    pub confidence_level: f64,
    /// Shrinkage weight applied
    pub lambda: Lambda,
    /// Prior volatility used for shrinkage
    pub prior: VolatilityPrior,
    /// One record per symbol, ordered by symbol
    pub records: BTreeMap<Symbol, RiskRecord>,
}

impl RiskReport {
    /// Record for a symbol.
    pub fn get(&self, symbol: &Symbol) -> Option<&RiskRecord> {
        self.records.get(symbol)
    }
}

/// Evaluates VaR, ES, shrinkage and CAPM beta over return series.
#[derive(Debug, Clone, Copy)]
pub struct RiskEngine {
    tail: GaussianTail,
}

impl RiskEngine {
    /// Engine reporting at 99% confidence.
    pub fn new() -> Result<Self, RiskError> {
        Ok(Self {
            tail: GaussianTail::ninety_nine()?,
        })
    }

    /// Engine reporting at a custom confidence level.
    pub fn with_confidence(confidence_level: f64) -> Result<Self, RiskError> {
        Ok(Self {
            tail: GaussianTail::new(confidence_level)?,
        })
    }

    /// Evaluate a normalized dataset.
    pub fn evaluate_dataset(
        &self,
        dataset: &NormalizedDataset,
        benchmark: &Symbol,
        shrinkage: Shrinkage,
    ) -> Result<RiskReport, RiskError> {
        self.evaluate(&dataset.series, benchmark, shrinkage)
    }

    /// Evaluate every series against `benchmark`.
    ///
    /// Degenerate series and missing benchmarks are reported through flags
    /// and omitted estimates. The only error is an empty series map.
    pub fn evaluate(
        &self,
        series: &BTreeMap<Symbol, ReturnSeries>,
        benchmark: &Symbol,
        shrinkage: Shrinkage,
    ) -> Result<RiskReport, RiskError> {
        if series.is_empty() {
            return Err(RiskError::InsufficientData(
                "no return series to evaluate".to_string(),
            ));
        }

        let profiles: Vec<(&Symbol, &ReturnSeries, Moments)> = series
            .par_iter()
            .map(|(symbol, returns)| (symbol, returns, Moments::of(&returns.returns())))
            .collect();

        let usable: Vec<f64> = profiles
            .iter()
            .filter_map(|(_, _, moments)| usable_volatility(moments))
            .collect();
        let prior = VolatilityPrior::resolve(shrinkage.prior, &usable);

        let benchmark_series = series.get(benchmark).filter(|s| !s.is_empty());
        if benchmark_series.is_none() {
            warn!(benchmark = %benchmark, "benchmark series unavailable, beta omitted");
        }

        let records: BTreeMap<Symbol, RiskRecord> = profiles
            .par_iter()
            .map(|(symbol, returns, moments)| {
                let record = self.assess(
                    symbol,
                    returns,
                    moments,
                    benchmark_series,
                    shrinkage.lambda,
                    &prior,
                );
                ((*symbol).clone(), record)
            })
            .collect();

        debug!(
            symbols = records.len(),
            benchmark = %benchmark,
            lambda = shrinkage.lambda.value(),
            prior = ?prior,
            "risk evaluation complete"
        );

        Ok(RiskReport {
            benchmark: benchmark.clone(),
            benchmark_available: benchmark_series.is_some(),
            confidence_level: self.tail.confidence_level(),
            lambda: shrinkage.lambda,
            prior,
            records,
        })
    }

    fn assess(
        &self,
        symbol: &Symbol,
        returns: &ReturnSeries,
        moments: &Moments,
        benchmark: Option<&ReturnSeries>,
        lambda: Lambda,
        prior: &VolatilityPrior,
    ) -> RiskRecord {
        let mut flags = BTreeSet::new();

        let finite = moments.is_finite();
        if !finite {
            flags.insert(RiskFlag::NonFiniteReplaced);
        }
        let mean = if finite { moments.mean } else { 0.0 };
        let volatility = if finite {
            moments.std_dev.unwrap_or(0.0)
        } else {
            0.0
        };

        let shrink_target = if lambda.is_zero() {
            None
        } else {
            match prior.value() {
                Some(value) => Some(value),
                None => {
                    flags.insert(RiskFlag::PriorUnavailable);
                    None
                }
            }
        };

        let degenerate = !finite || moments.count < 2 || volatility == 0.0;
        let (shrunk_volatility, tail) = if degenerate {
            flags.insert(RiskFlag::Degenerate);
            (volatility, TailRisk::zero(self.tail.confidence_level()))
        } else {
            let sigma = match shrink_target {
                Some(target) => {
                    flags.insert(RiskFlag::Shrunk);
                    shrink(volatility, lambda, target)
                }
                None => volatility,
            };
            let tail = self.tail.evaluate(mean, sigma);
            if tail.var.is_finite() && tail.expected_shortfall.is_finite() {
                (sigma, tail)
            } else {
                flags.insert(RiskFlag::NonFiniteReplaced);
                flags.insert(RiskFlag::Degenerate);
                (sigma, TailRisk::zero(self.tail.confidence_level()))
            }
        };

        let regression = match benchmark {
            Some(bench) => CapmRegression::fit(&returns.align_with(bench)),
            None => CapmRegression::omitted(OmissionReason::BenchmarkUnavailable, 0),
        };
        for estimate in [regression.beta, regression.residual_volatility] {
            if let Some(reason) = estimate.omission() {
                flags.insert(reason.flag());
            }
        }

        RiskRecord {
            symbol: symbol.clone(),
            observations: moments.count,
            mean,
            volatility,
            shrunk_volatility,
            var_99: tail.var,
            expected_shortfall_99: tail.expected_shortfall,
            beta: regression.beta,
            residual_volatility: regression.residual_volatility,
            aligned_observations: regression.observations,
            flags,
        }
    }
}

/// Volatility eligible for the cross-sectional prior.
fn usable_volatility(moments: &Moments) -> Option<f64> {
    if !moments.is_finite() {
        return None;
    }
    moments.std_dev.filter(|v| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn series_from_prices(symbol: &str, prices: &[f64]) -> ReturnSeries {
        let map: BTreeMap<NaiveDate, f64> = prices
            .iter()
            .enumerate()
            .map(|(i, px)| (d(i as u32 + 1), *px))
            .collect();
        ReturnSeries::from_prices(sym(symbol), &map)
    }

    fn series_map(items: Vec<ReturnSeries>) -> BTreeMap<Symbol, ReturnSeries> {
        items.into_iter().map(|s| (s.symbol().clone(), s)).collect()
    }

    #[test]
    fn test_two_point_beta_matches_hand_derivation() {
        let aapl = series_from_prices("AAPL", &[100.0, 102.0, 101.0]);
        let spy = series_from_prices("SPY", &[100.0, 101.0, 98.98]);
        let a = aapl.returns();
        let b = spy.returns();
        let map = series_map(vec![aapl, spy]);

        let engine = RiskEngine::new().unwrap();
        let report = engine.evaluate(&map, &sym("SPY"), Shrinkage::none()).unwrap();
        let record = report.get(&sym("AAPL")).unwrap();

        // With two points, Cov/Var reduces to the ratio of first differences.
        let expected = (a[0] - a[1]) / (b[0] - b[1]);
        assert_relative_eq!(record.beta.value().unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(record.beta.value().unwrap(), 0.993_464, epsilon = 1e-5);
        assert_relative_eq!(
            record.residual_volatility.value().unwrap(),
            0.0,
            epsilon = 1e-12
        );
        assert_eq!(record.aligned_observations, 2);
        assert!(report.benchmark_available);
    }

    #[test]
    fn test_benchmark_regressed_on_itself() {
        let spy = series_from_prices("SPY", &[100.0, 101.0, 98.98, 99.5, 102.0]);
        let map = series_map(vec![spy]);

        let engine = RiskEngine::new().unwrap();
        let report = engine.evaluate(&map, &sym("SPY"), Shrinkage::none()).unwrap();
        let record = report.get(&sym("SPY")).unwrap();

        assert_eq!(record.beta.value(), Some(1.0));
        assert_eq!(record.residual_volatility.value(), Some(0.0));
    }

    #[test]
    fn test_missing_benchmark_keeps_tail_measures() {
        let aapl = series_from_prices("AAPL", &[100.0, 102.0, 101.0, 97.0]);
        let map = series_map(vec![aapl]);

        let engine = RiskEngine::new().unwrap();
        let report = engine.evaluate(&map, &sym("SPY"), Shrinkage::none()).unwrap();
        let record = report.get(&sym("AAPL")).unwrap();

        assert!(!report.benchmark_available);
        assert_eq!(
            record.beta.omission(),
            Some(OmissionReason::BenchmarkUnavailable)
        );
        assert!(record.has_flag(RiskFlag::BenchmarkUnavailable));
        assert!(record.var_99 > 0.0);
        assert!(record.expected_shortfall_99 >= record.var_99);
    }

    #[test]
    fn test_single_return_is_degenerate() {
        let x = series_from_prices("X", &[100.0, 101.0]);
        let map = series_map(vec![x]);

        let engine = RiskEngine::new().unwrap();
        let report = engine.evaluate(&map, &sym("SPY"), Shrinkage::none()).unwrap();
        let record = report.get(&sym("X")).unwrap();

        assert_eq!(record.observations, 1);
        assert_eq!(record.var_99, 0.0);
        assert_eq!(record.expected_shortfall_99, 0.0);
        assert!(record.has_flag(RiskFlag::Degenerate));
    }

    #[test]
    fn test_constant_prices_are_degenerate() {
        let flat = series_from_prices("FLAT", &[50.0, 50.0, 50.0, 50.0]);
        let map = series_map(vec![flat]);

        let report = RiskEngine::new()
            .unwrap()
            .evaluate(&map, &sym("FLAT"), Shrinkage::none())
            .unwrap();
        let record = report.get(&sym("FLAT")).unwrap();

        assert_eq!(record.var_99, 0.0);
        assert!(record.has_flag(RiskFlag::Degenerate));
        assert_eq!(
            record.beta.omission(),
            Some(OmissionReason::ZeroBenchmarkVariance)
        );
    }

    #[test]
    fn test_cross_sectional_shrinkage() {
        let a = series_from_prices("A", &[100.0, 101.0, 99.0, 100.5]);
        let b = series_from_prices("B", &[100.0, 110.0, 95.0, 105.0]);
        let map = series_map(vec![a, b]);

        let engine = RiskEngine::new().unwrap();
        let full = Shrinkage::new(Lambda::new(1.0).unwrap());
        let report = engine.evaluate(&map, &sym("A"), full).unwrap();

        let prior = report.prior.value().unwrap();
        for record in report.records.values() {
            assert!(record.has_flag(RiskFlag::Shrunk));
            assert_relative_eq!(record.shrunk_volatility, prior, epsilon = 1e-15);
        }
        let mean_vol = (report.records[&sym("A")].volatility
            + report.records[&sym("B")].volatility)
            / 2.0;
        assert_relative_eq!(prior, mean_vol, epsilon = 1e-15);
    }

    #[test]
    fn test_prior_unavailable_is_a_no_op() {
        let a = series_from_prices("A", &[100.0, 101.0, 99.0, 100.5]);
        let map = series_map(vec![a]);

        let engine = RiskEngine::new().unwrap();
        let plain = engine.evaluate(&map, &sym("A"), Shrinkage::none()).unwrap();
        let shrunk = engine
            .evaluate(&map, &sym("A"), Shrinkage::new(Lambda::new(0.5).unwrap()))
            .unwrap();

        let (p, s) = (&plain.records[&sym("A")], &shrunk.records[&sym("A")]);
        assert_eq!(p.var_99, s.var_99);
        assert!(s.has_flag(RiskFlag::PriorUnavailable));
        assert!(!s.has_flag(RiskFlag::Shrunk));
    }

    #[test]
    fn test_supplied_prior() {
        let a = series_from_prices("A", &[100.0, 101.0, 99.0, 100.5]);
        let map = series_map(vec![a]);

        let engine = RiskEngine::new().unwrap();
        let shrinkage = Shrinkage::new(Lambda::new(1.0).unwrap()).with_prior(Some(0.05));
        let report = engine.evaluate(&map, &sym("A"), shrinkage).unwrap();

        assert_eq!(report.prior, VolatilityPrior::Supplied { value: 0.05 });
        assert_relative_eq!(report.records[&sym("A")].shrunk_volatility, 0.05);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let engine = RiskEngine::new().unwrap();
        let err = engine
            .evaluate(&BTreeMap::new(), &sym("SPY"), Shrinkage::none())
            .unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData(_)));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let items: Vec<ReturnSeries> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                series_from_prices(
                    &format!("S{i:02}"),
                    &[base, base * 1.01, base * 0.98, base * 1.03, base * 0.995],
                )
            })
            .collect();
        let map = series_map(items);

        let engine = RiskEngine::new().unwrap();
        let shrinkage = Shrinkage::new(Lambda::new(0.3).unwrap());
        let first = engine.evaluate(&map, &sym("S00"), shrinkage).unwrap();
        let second = engine.evaluate(&map, &sym("S00"), shrinkage).unwrap();
        assert_eq!(first, second);
    }
}
