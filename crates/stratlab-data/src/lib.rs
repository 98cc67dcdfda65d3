//! # StratLab Data
//!
//! Turns an uploaded table into canonical per-symbol return series.
//!
//! - [`reader`]: Delimited-text input (CSV, TSV, semicolon) into a [`RawTable`]
//! - [`columnar`]: Parquet input through Arrow record batches
//! - [`coerce`]: Row-level coercion producing [`RowOutcome::Valid`] or [`RowOutcome::Skipped`]
//! - [`normalize`]: Grouping, sorting, de-duplication and simple returns
//! - [`inspect`]: Cheap dataset summary for upload validation
//!
//! ## Example
//!
//! ```ignore
//! use stratlab_data::{reader, normalize};
//!
//! let table = reader::read_str("Date,Symbol,Px\n2024-01-01,AAPL,100\n2024-01-02,AAPL,102\n")?;
//! let dataset = normalize(&table)?;
//! assert_eq!(dataset.series.len(), 1);
//! ```
//!
//! Malformed rows never abort a batch. Only a table that yields no usable
//! series at all is an error.
//!
//! [`RawTable`]: stratlab_core::RawTable

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coerce;
pub mod columnar;
pub mod inspect;
pub mod normalize;
pub mod reader;
pub mod series;
mod error;

pub use coerce::{RowIssue, RowOutcome, SkipReason};
pub use error::{ValidationError, ValidationResult};
pub use inspect::{inspect, DatasetSummary};
pub use normalize::{
    normalize, ColumnMap, NormalizationReport, NormalizedDataset, SkippedSymbol,
    SymbolSkipReason,
};
pub use series::{AlignedPair, ReturnSeries};
