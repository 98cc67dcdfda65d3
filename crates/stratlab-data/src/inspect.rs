//! Dataset inspection.
//!
//! A quick look at an upload before committing to a full analysis: which
//! columns were recognized, how many rows coerce, which symbols are present
//! and over what dates.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stratlab_core::RawTable;

use crate::error::ValidationResult;
use crate::normalize::{group_prices, ColumnMap, NormalizationReport, MIN_PRICE_OBSERVATIONS};

/// Per-symbol coverage in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolCoverage {
    /// Valid price observations
    pub observations: usize,
    /// First observation date
    pub first_date: NaiveDate,
    /// Last observation date
    pub last_date: NaiveDate,
    /// Whether the symbol has enough prices to produce returns
    pub usable: bool,
}

/// Summary of an uploaded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Data rows in the input
    pub rows: usize,
    /// Header as supplied
    pub columns: Vec<String>,
    /// Resolved positions of the required columns
    pub column_map: ColumnMap,
    /// Rows that coerced successfully
    pub rows_accepted: usize,
    /// Rows dropped during coercion
    pub rows_skipped: usize,
    /// Coverage by symbol
    pub symbols: BTreeMap<String, SymbolCoverage>,
    /// Earliest valid date across all symbols
    pub first_date: Option<NaiveDate>,
    /// Latest valid date across all symbols
    pub last_date: Option<NaiveDate>,
}

/// Summarize a table without computing returns.
///
/// Fails only when a required column is missing.
pub fn inspect(table: &RawTable) -> ValidationResult<DatasetSummary> {
    let column_map = ColumnMap::resolve(table)?;
    let mut report = NormalizationReport {
        rows_total: table.len(),
        ..Default::default()
    };
    let prices = group_prices(table, &column_map, &mut report);

    let mut symbols = BTreeMap::new();
    for (symbol, by_date) in &prices {
        let (Some((first, _)), Some((last, _))) = (by_date.first_key_value(), by_date.last_key_value())
        else {
            continue;
        };
        symbols.insert(
            symbol.to_string(),
            SymbolCoverage {
                observations: by_date.len(),
                first_date: *first,
                last_date: *last,
                usable: by_date.len() >= MIN_PRICE_OBSERVATIONS,
            },
        );
    }

    let first_date = symbols.values().map(|c| c.first_date).min();
    let last_date = symbols.values().map(|c| c.last_date).max();

    Ok(DatasetSummary {
        rows: table.len(),
        columns: table.columns.clone(),
        column_map,
        rows_accepted: report.rows_accepted,
        rows_skipped: report.rows_skipped,
        symbols,
        first_date,
        last_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_str;

    #[test]
    fn test_inspect_summary() {
        let table = read_str(
            "date,symbol,px,volume\n\
             2024-01-02,SPY,470,1\n\
             2024-01-03,SPY,472,1\n\
             2024-01-05,AAPL,185,1\n\
             oops,AAPL,186,1\n",
        )
        .unwrap();

        let summary = inspect(&table).unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.rows_accepted, 3);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.column_map.price, 2);
        assert!(summary.symbols["SPY"].usable);
        assert!(!summary.symbols["AAPL"].usable);
        assert_eq!(summary.first_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(summary.last_date, NaiveDate::from_ymd_opt(2024, 1, 5));
    }

    #[test]
    fn test_inspect_requires_columns() {
        let table = read_str("when,what\n2024-01-01,x\n").unwrap();
        assert!(inspect(&table).is_err());
    }
}
