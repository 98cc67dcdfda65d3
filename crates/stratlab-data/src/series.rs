//! Per-symbol simple-return series.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stratlab_core::Symbol;

/// Date-ordered simple returns for one symbol.
///
/// `r[t] = p[t] / p[t-1] - 1`; the first price date carries no return and
/// does not appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    symbol: Symbol,
    points: Vec<(NaiveDate, f64)>,
}

impl ReturnSeries {
    /// Build returns from a date-ordered price map.
    pub fn from_prices(symbol: Symbol, prices: &BTreeMap<NaiveDate, f64>) -> Self {
        let points = prices
            .iter()
            .zip(prices.iter().skip(1))
            .map(|((_, prev), (date, px))| (*date, px / prev - 1.0))
            .collect();
        Self { symbol, points }
    }

    /// Build a series directly from dated returns. Points are sorted by date
    /// and a repeated date keeps its last value.
    pub fn from_returns(symbol: Symbol, points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let points: BTreeMap<NaiveDate, f64> = points.into_iter().collect();
        Self {
            symbol,
            points: points.into_iter().collect(),
        }
    }

    /// The symbol this series belongs to.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Number of returns.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no returns.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Dated returns in ascending date order.
    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    /// Return values in date order.
    pub fn returns(&self) -> Vec<f64> {
        self.points.iter().map(|(_, r)| *r).collect()
    }

    /// First and last return dates.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.points.first(), self.points.last()) {
            (Some((first, _)), Some((last, _))) => Some((*first, *last)),
            _ => None,
        }
    }

    /// Intersect with another series on date.
    pub fn align_with(&self, other: &ReturnSeries) -> AlignedPair {
        let mut aligned = AlignedPair::default();
        let (mut i, mut j) = (0, 0);

        while i < self.points.len() && j < other.points.len() {
            let (da, ra) = self.points[i];
            let (db, rb) = other.points[j];
            match da.cmp(&db) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    aligned.dates.push(da);
                    aligned.left.push(ra);
                    aligned.right.push(rb);
                    i += 1;
                    j += 1;
                }
            }
        }

        aligned
    }
}

/// Two return series restricted to their common dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedPair {
    /// Common dates, ascending
    pub dates: Vec<NaiveDate>,
    /// Returns of the series `align_with` was called on
    pub left: Vec<f64>,
    /// Returns of the argument series
    pub right: Vec<f64>,
}

impl AlignedPair {
    /// Number of aligned observations.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether no dates overlap.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn test_simple_returns() {
        let prices: BTreeMap<_, _> = [(d(1), 100.0), (d(2), 102.0), (d(3), 101.0)].into();
        let series = ReturnSeries::from_prices(sym("AAPL"), &prices);

        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].0, d(2));
        assert_relative_eq!(series.points()[0].1, 0.02, epsilon = 1e-12);
        assert_relative_eq!(series.points()[1].1, 101.0 / 102.0 - 1.0, epsilon = 1e-15);
        assert_eq!(series.date_range(), Some((d(2), d(3))));
    }

    #[test]
    fn test_single_price_has_no_returns() {
        let prices: BTreeMap<_, _> = [(d(1), 100.0)].into();
        let series = ReturnSeries::from_prices(sym("X"), &prices);
        assert!(series.is_empty());
        assert_eq!(series.date_range(), None);
    }

    #[test]
    fn test_alignment_uses_date_intersection() {
        let a = ReturnSeries::from_returns(sym("A"), [(d(2), 0.1), (d(3), 0.2), (d(5), 0.3)]);
        let b = ReturnSeries::from_returns(sym("B"), [(d(3), -0.1), (d(4), -0.2), (d(5), -0.3)]);

        let aligned = a.align_with(&b);
        assert_eq!(aligned.dates, vec![d(3), d(5)]);
        assert_eq!(aligned.left, vec![0.2, 0.3]);
        assert_eq!(aligned.right, vec![-0.1, -0.3]);
    }

    #[test]
    fn test_from_returns_sorts_and_dedups() {
        let s = ReturnSeries::from_returns(sym("A"), [(d(3), 0.3), (d(2), 0.2), (d(3), 0.4)]);
        assert_eq!(s.points(), &[(d(2), 0.2), (d(3), 0.4)]);
    }
}
