//! Row-level coercion.
//!
//! Every input row becomes either [`RowOutcome::Valid`] with a typed
//! [`RawRecord`] or [`RowOutcome::Skipped`] with the reason it was dropped.
//! Nothing in this module returns an error for a single bad cell.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use stratlab_core::{Cell, RawRecord, Symbol};

/// Accepted calendar-date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y"];

/// Accepted date-time layouts; the time part is discarded.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Numeric dates in this range are read as `YYYYMMDD`, anything else as epoch seconds.
const COMPACT_DATE_RANGE: std::ops::RangeInclusive<f64> = 19_000_101.0..=29_991_231.0;

/// Longest raw value echoed back in a skip reason.
const MAX_ECHO_LEN: usize = 64;

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Row has no value in the date column
    MissingDate,
    /// Date value could not be read as a calendar date
    UnparseableDate {
        /// Offending value
        value: String,
    },
    /// Row has no value in the symbol column
    MissingSymbol,
    /// Row has no value in the price column
    MissingPrice,
    /// Price column holds a date
    DateInPriceColumn {
        /// Offending value
        value: String,
    },
    /// Price is not a finite number
    NonNumericPrice {
        /// Offending value
        value: String,
    },
    /// Price is zero or negative
    NonPositivePrice {
        /// Offending value
        value: f64,
    },
}

/// A skipped row and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    /// 1-based data row number (header excluded)
    pub row: usize,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Outcome of coercing one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Row coerced into a typed record
    Valid(RawRecord),
    /// Row dropped
    Skipped(RowIssue),
}

impl RowOutcome {
    /// Whether the row survived coercion.
    pub fn is_valid(&self) -> bool {
        matches!(self, RowOutcome::Valid(_))
    }
}

/// Coerce the three relevant cells of a row.
///
/// Missing cells (short rows) are passed as `None`.
pub fn coerce_row(
    row: usize,
    date: Option<&Cell>,
    symbol: Option<&Cell>,
    price: Option<&Cell>,
) -> RowOutcome {
    let result = (|| {
        let date = parse_date(date.unwrap_or(&Cell::Null))?;
        let symbol = parse_symbol(symbol.unwrap_or(&Cell::Null))?;
        let price = parse_price(price.unwrap_or(&Cell::Null))?;
        Ok(RawRecord::new(date, symbol, price))
    })();

    match result {
        Ok(record) => RowOutcome::Valid(record),
        Err(reason) => RowOutcome::Skipped(RowIssue { row, reason }),
    }
}

/// Parse a calendar date from a cell.
pub fn parse_date(cell: &Cell) -> Result<NaiveDate, SkipReason> {
    match cell {
        Cell::Null => Err(SkipReason::MissingDate),
        Cell::Text(s) if s.trim().is_empty() => Err(SkipReason::MissingDate),
        Cell::Text(s) => parse_date_str(s.trim()).ok_or_else(|| SkipReason::UnparseableDate {
            value: echo(s),
        }),
        Cell::Number(v) => parse_date_number(*v).ok_or_else(|| SkipReason::UnparseableDate {
            value: v.to_string(),
        }),
    }
}

/// Parse a date from text, trying the supported layouts in order.
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<u32>().ok().and_then(compact_date);
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

fn parse_date_number(v: f64) -> Option<NaiveDate> {
    if !v.is_finite() || v.fract() != 0.0 {
        return None;
    }
    if COMPACT_DATE_RANGE.contains(&v) {
        if let Some(d) = compact_date(v as u32) {
            return Some(d);
        }
    }
    DateTime::from_timestamp(v as i64, 0).map(|dt| dt.date_naive())
}

/// `YYYYMMDD` packed into an integer.
fn compact_date(v: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((v / 10_000) as i32, (v / 100) % 100, v % 100)
}

/// Parse a symbol from a cell.
pub fn parse_symbol(cell: &Cell) -> Result<Symbol, SkipReason> {
    let text = match cell {
        Cell::Null => return Err(SkipReason::MissingSymbol),
        Cell::Text(s) => s.clone(),
        Cell::Number(v) if v.is_finite() && v.fract() == 0.0 => format!("{}", *v as i64),
        Cell::Number(v) => v.to_string(),
    };
    Symbol::new(text).map_err(|_| SkipReason::MissingSymbol)
}

/// Parse a strictly positive, finite price from a cell.
pub fn parse_price(cell: &Cell) -> Result<f64, SkipReason> {
    let value = match cell {
        Cell::Null => return Err(SkipReason::MissingPrice),
        Cell::Number(v) => *v,
        Cell::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(SkipReason::MissingPrice);
            }
            match s.parse::<f64>() {
                Ok(v) => v,
                Err(_) if looks_like_date(s) => {
                    return Err(SkipReason::DateInPriceColumn { value: echo(s) })
                }
                Err(_) => return Err(SkipReason::NonNumericPrice { value: echo(s) }),
            }
        }
    };

    if !value.is_finite() {
        return Err(SkipReason::NonNumericPrice {
            value: value.to_string(),
        });
    }
    if value <= 0.0 {
        return Err(SkipReason::NonPositivePrice { value });
    }
    Ok(value)
}

fn looks_like_date(s: &str) -> bool {
    (s.contains('-') || s.contains('/')) && parse_date_str(s).is_some()
}

fn echo(s: &str) -> String {
    s.chars().take(MAX_ECHO_LEN).collect()
}
