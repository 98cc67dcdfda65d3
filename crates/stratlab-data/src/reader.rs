//! Table input.
//!
//! Reads CSV, TSV or semicolon-separated text into a [`RawTable`]. Every
//! field is kept as text; typing happens later, row by row. Parquet input
//! is handed to [`columnar`](crate::columnar).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use csv::{ReaderBuilder, Trim};
use tracing::debug;

use stratlab_core::{Cell, RawTable};

use crate::columnar;
use crate::error::{ValidationError, ValidationResult};

/// Candidate delimiters, in tie-break order.
const DELIMITERS: &[u8] = &[b',', b'\t', b';', b'|'];

/// Columnar formats that are recognized but not read.
const UNREAD_COLUMNAR_EXTENSIONS: &[&str] = &["feather", "arrow", "orc"];

/// Read a table file. `.parquet` files are decoded as Parquet; anything
/// else is delimited text whose delimiter comes from the extension (`.tsv`)
/// or is sniffed from the header line.
pub fn read_path(path: impl AsRef<Path>) -> ValidationResult<RawTable> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if extension == "parquet" {
        return columnar::read_parquet_path(path);
    }
    if UNREAD_COLUMNAR_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedFormat(format!(
            "columnar '.{}' input; export the table as parquet or delimited text",
            extension
        )));
    }

    let mut text = String::new();
    File::open(path)?.read_to_string(&mut text)?;

    let delimiter = match extension.as_str() {
        "tsv" | "tab" => b'\t',
        _ => sniff_delimiter(&text),
    };
    debug!(path = %path.display(), delimiter = %(delimiter as char).escape_default(), "Reading table");
    read_reader(text.as_bytes(), delimiter)
}

/// Read an uploaded file body. Parquet is detected by its magic bytes;
/// anything else must be UTF-8 delimited text.
pub fn read_bytes(bytes: Bytes) -> ValidationResult<RawTable> {
    if columnar::is_parquet(&bytes) {
        return columnar::read_parquet_bytes(bytes);
    }
    let text = std::str::from_utf8(&bytes).map_err(|e| {
        ValidationError::UnsupportedFormat(format!("upload is neither parquet nor UTF-8 text: {e}"))
    })?;
    read_str(text)
}

/// Read delimited text held in memory, sniffing the delimiter.
pub fn read_str(text: &str) -> ValidationResult<RawTable> {
    read_reader(text.as_bytes(), sniff_delimiter(text))
}

/// Read delimited text with an explicit delimiter.
pub fn read_reader<R: Read>(reader: R, delimiter: u8) -> ValidationResult<RawTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let columns = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut table = RawTable {
        columns,
        rows: Vec::new(),
    };
    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(Cell::from_field).collect());
    }

    Ok(table)
}

/// Pick the delimiter that splits the header line into the most fields.
pub fn sniff_delimiter(sample: &str) -> u8 {
    let header = sample.lines().next().unwrap_or_default();
    DELIMITERS
        .iter()
        .copied()
        .max_by_key(|d| {
            let count = header.bytes().filter(|b| b == d).count();
            // Earlier candidates win ties.
            let priority = DELIMITERS.len() - DELIMITERS.iter().position(|x| x == d).unwrap_or(0);
            (count, priority)
        })
        .unwrap_or(b',')
}
