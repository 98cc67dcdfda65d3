//! Table normalization into per-symbol return series.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stratlab_core::{RawTable, Symbol};

use crate::coerce::{coerce_row, RowIssue, RowOutcome};
use crate::error::{ValidationError, ValidationResult};
use crate::series::ReturnSeries;

/// Accepted names for the date column.
pub const DATE_COLUMNS: &[&str] = &["date", "as_of", "timestamp"];
/// Accepted names for the symbol column.
pub const SYMBOL_COLUMNS: &[&str] = &["symbol", "ticker"];
/// Accepted names for the price column.
pub const PRICE_COLUMNS: &[&str] = &["px", "price", "close"];

/// Row issues kept verbatim in the report; the rest are only counted.
pub const MAX_REPORTED_ISSUES: usize = 50;

/// Minimum prices per symbol to produce at least one return.
pub const MIN_PRICE_OBSERVATIONS: usize = 2;

/// Resolved positions of the required columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Date column index
    pub date: usize,
    /// Symbol column index
    pub symbol: usize,
    /// Price column index
    pub price: usize,
}

impl ColumnMap {
    /// Locate the required columns, case-insensitively. Extra columns are ignored.
    pub fn resolve(table: &RawTable) -> ValidationResult<Self> {
        Ok(Self {
            date: find_column(table, "date", DATE_COLUMNS)?,
            symbol: find_column(table, "symbol", SYMBOL_COLUMNS)?,
            price: find_column(table, "px", PRICE_COLUMNS)?,
        })
    }
}

fn find_column(
    table: &RawTable,
    column: &'static str,
    aliases: &[&str],
) -> ValidationResult<usize> {
    aliases
        .iter()
        .find_map(|alias| table.column_index(alias))
        .ok_or_else(|| ValidationError::MissingColumn {
            column,
            accepted: aliases.join(", "),
        })
}

/// Why a whole symbol was left out of the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolSkipReason {
    /// Not enough valid prices to form a return
    InsufficientObservations {
        /// Valid price observations found
        observations: usize,
    },
}

/// A symbol excluded from the series set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    /// The symbol
    pub symbol: Symbol,
    /// Why it was excluded
    pub reason: SymbolSkipReason,
}

/// Bookkeeping from a normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Data rows in the input
    pub rows_total: usize,
    /// Rows that coerced successfully
    pub rows_accepted: usize,
    /// Rows dropped during coercion
    pub rows_skipped: usize,
    /// Rows that replaced an earlier row for the same (date, symbol)
    pub duplicates_overwritten: usize,
    /// First [`MAX_REPORTED_ISSUES`] row issues
    pub issues: Vec<RowIssue>,
    /// Symbols excluded from the output
    pub skipped_symbols: Vec<SkippedSymbol>,
}

impl NormalizationReport {
    fn record_issue(&mut self, issue: RowIssue) {
        self.rows_skipped += 1;
        if self.issues.len() < MAX_REPORTED_ISSUES {
            debug!(row = issue.row, reason = ?issue.reason, "Skipping row");
            self.issues.push(issue);
        }
    }
}

/// Canonical per-symbol return series plus the normalization report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDataset {
    /// Return series keyed by symbol, each with at least one return
    pub series: BTreeMap<Symbol, ReturnSeries>,
    /// What was dropped and why
    pub report: NormalizationReport,
}

impl NormalizedDataset {
    /// Whether a symbol survived normalization.
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.series.contains_key(symbol)
    }

    /// Series for a symbol.
    pub fn get(&self, symbol: &Symbol) -> Option<&ReturnSeries> {
        self.series.get(symbol)
    }
}

/// Coerce every row of a table, in input order.
pub fn coerce_rows<'a>(
    table: &'a RawTable,
    columns: &'a ColumnMap,
) -> impl Iterator<Item = RowOutcome> + 'a {
    table.rows.iter().enumerate().map(move |(i, row)| {
        coerce_row(
            i + 1,
            row.get(columns.date),
            row.get(columns.symbol),
            row.get(columns.price),
        )
    })
}

/// Group prices by symbol and date. Later rows win for a repeated (date, symbol).
pub(crate) fn group_prices(
    table: &RawTable,
    columns: &ColumnMap,
    report: &mut NormalizationReport,
) -> BTreeMap<Symbol, BTreeMap<NaiveDate, f64>> {
    let mut prices: BTreeMap<Symbol, BTreeMap<NaiveDate, f64>> = BTreeMap::new();

    for outcome in coerce_rows(table, columns) {
        match outcome {
            RowOutcome::Valid(record) => {
                report.rows_accepted += 1;
                let previous = prices
                    .entry(record.symbol)
                    .or_default()
                    .insert(record.date, record.price);
                if previous.is_some() {
                    report.duplicates_overwritten += 1;
                }
            }
            RowOutcome::Skipped(issue) => report.record_issue(issue),
        }
    }

    prices
}

/// Normalize a raw table into per-symbol simple-return series.
///
/// Fails only when the header lacks a required column or when no symbol
/// keeps enough valid prices to form a return.
pub fn normalize(table: &RawTable) -> ValidationResult<NormalizedDataset> {
    let columns = ColumnMap::resolve(table)?;
    let mut report = NormalizationReport {
        rows_total: table.len(),
        ..Default::default()
    };

    let prices = group_prices(table, &columns, &mut report);

    let mut series = BTreeMap::new();
    for (symbol, by_date) in prices {
        if by_date.len() < MIN_PRICE_OBSERVATIONS {
            debug!(symbol = %symbol, observations = by_date.len(), "Excluding symbol");
            report.skipped_symbols.push(SkippedSymbol {
                symbol,
                reason: SymbolSkipReason::InsufficientObservations {
                    observations: by_date.len(),
                },
            });
            continue;
        }
        let returns = ReturnSeries::from_prices(symbol.clone(), &by_date);
        series.insert(symbol, returns);
    }

    if report.rows_skipped > 0 || report.duplicates_overwritten > 0 {
        warn!(
            rows_total = report.rows_total,
            rows_skipped = report.rows_skipped,
            duplicates = report.duplicates_overwritten,
            "Dropped malformed or duplicate rows during normalization"
        );
    }

    if series.is_empty() {
        let detail = if report.rows_accepted == 0 {
            format!("none of {} rows could be coerced", report.rows_total)
        } else {
            format!(
                "no symbol has at least {} valid price observations",
                MIN_PRICE_OBSERVATIONS
            )
        };
        return Err(ValidationError::NoUsableData(detail));
    }

    debug!(
        symbols = series.len(),
        rows_accepted = report.rows_accepted,
        "Normalized dataset"
    );

    Ok(NormalizedDataset { series, report })
}
