//! Typed price observations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::Symbol;

/// One coerced input row: a strictly positive price for a symbol on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Observation date
    pub date: NaiveDate,
    /// Instrument symbol
    pub symbol: Symbol,
    /// Price, always finite and > 0
    pub price: f64,
}

impl RawRecord {
    /// Create a record. Callers are expected to have validated `price`.
    pub fn new(date: NaiveDate, symbol: Symbol, price: f64) -> Self {
        Self {
            date,
            symbol,
            price,
        }
    }
}
