//! Columnar (Parquet) input.
//!
//! Parquet files are decoded through Arrow record batches. Numeric columns
//! become [`Cell::Number`], date and timestamp columns become ISO dates, and
//! everything else is rendered as text for the row coercer.

use std::fs::File;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Float64Type};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;
use tracing::debug;

use stratlab_core::{Cell, RawTable};

use crate::error::ValidationResult;

/// Leading (and trailing) magic bytes of a Parquet file.
pub const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Whether `bytes` look like a Parquet file.
pub fn is_parquet(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && bytes.starts_with(PARQUET_MAGIC) && bytes.ends_with(PARQUET_MAGIC)
}

/// Read a Parquet file from disk.
pub fn read_parquet_path(path: impl AsRef<Path>) -> ValidationResult<RawTable> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Reading parquet table");
    read_parquet(File::open(path)?)
}

/// Read a Parquet file held in memory.
pub fn read_parquet_bytes(bytes: Bytes) -> ValidationResult<RawTable> {
    read_parquet(bytes)
}

fn read_parquet<R: ChunkReader + 'static>(source: R) -> ValidationResult<RawTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(source)?;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect::<Vec<_>>();

    let mut table = RawTable {
        columns,
        rows: Vec::new(),
    };
    for batch in builder.build()? {
        let batch = batch?;
        let cells = batch
            .columns()
            .iter()
            .map(column_cells)
            .collect::<ValidationResult<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            table.push_row(cells.iter().map(|column| column[row].clone()).collect());
        }
    }

    debug!(rows = table.len(), columns = table.columns.len(), "Parquet table read");
    Ok(table)
}

fn column_cells(array: &ArrayRef) -> ValidationResult<Vec<Cell>> {
    let data_type = array.data_type();

    if matches!(
        data_type,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _)
    ) {
        let dates = cast(array, &DataType::Date32)?;
        let dates = dates.as_primitive::<Date32Type>();
        return Ok((0..dates.len())
            .map(|i| match dates.value_as_date(i) {
                Some(date) if dates.is_valid(i) => Cell::Text(date.format("%Y-%m-%d").to_string()),
                _ => Cell::Null,
            })
            .collect());
    }

    if data_type.is_numeric() {
        let values = cast(array, &DataType::Float64)?;
        let values = values.as_primitive::<Float64Type>();
        return Ok((0..values.len())
            .map(|i| {
                if values.is_valid(i) {
                    Cell::Number(values.value(i))
                } else {
                    Cell::Null
                }
            })
            .collect());
    }

    let text = cast(array, &DataType::Utf8)?;
    let text = text.as_string::<i32>();
    Ok((0..text.len())
        .map(|i| {
            if text.is_valid(i) {
                Cell::from_field(text.value(i))
            } else {
                Cell::Null
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Date32Array, Float64Array, Int64Array, StringArray, TimestampSecondArray};
    use arrow::datatypes::{Field, Schema, TimeUnit};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use crate::normalize::normalize;
    use crate::reader::read_path;

    // 2024-01-01 as days since the Unix epoch.
    const JAN_1: i32 = 19_723;

    fn write_parquet(batch: &RecordBatch) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
        buffer
    }

    fn price_batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("Date", DataType::Date32, false),
            Field::new("Symbol", DataType::Utf8, false),
            Field::new("Px", DataType::Float64, true),
            Field::new("Volume", DataType::Int64, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Date32Array::from(vec![JAN_1, JAN_1 + 1, JAN_1 + 2, JAN_1 + 3])),
                Arc::new(StringArray::from(vec!["AAPL", "AAPL", "AAPL", "AAPL"])),
                Arc::new(Float64Array::from(vec![Some(100.0), Some(102.0), Some(101.0), None])),
                Arc::new(Int64Array::from(vec![Some(10), None, Some(30), Some(40)])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_read_parquet_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.parquet");
        std::fs::write(&path, write_parquet(&price_batch())).unwrap();

        let table = read_path(&path).unwrap();
        assert_eq!(table.columns, vec!["Date", "Symbol", "Px", "Volume"]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows[0][0], Cell::Text("2024-01-01".into()));
        assert_eq!(table.rows[2][1], Cell::Text("AAPL".into()));
        assert_eq!(table.rows[1][2], Cell::Number(102.0));
        assert_eq!(table.rows[3][2], Cell::Null);
        assert_eq!(table.rows[1][3], Cell::Null);

        let dataset = normalize(&table).unwrap();
        assert_eq!(dataset.report.rows_accepted, 3);
        assert_eq!(dataset.series.len(), 1);
    }

    #[test]
    fn test_read_parquet_bytes_with_timestamps() {
        let schema = Schema::new(vec![
            Field::new("timestamp", DataType::Timestamp(TimeUnit::Second, None), false),
            Field::new("ticker", DataType::Utf8, false),
            Field::new("close", DataType::Int64, false),
        ]);
        let day = 86_400_i64;
        let start = JAN_1 as i64 * day + 16 * 3_600;
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(TimestampSecondArray::from(vec![start, start + day])),
                Arc::new(StringArray::from(vec!["SPY", "SPY"])),
                Arc::new(Int64Array::from(vec![470, 472])),
            ],
        )
        .unwrap();

        let bytes = Bytes::from(write_parquet(&batch));
        assert!(is_parquet(&bytes));

        let table = read_parquet_bytes(bytes).unwrap();
        assert_eq!(table.rows[0][0], Cell::Text("2024-01-01".into()));
        assert_eq!(table.rows[1][0], Cell::Text("2024-01-02".into()));
        assert_eq!(table.rows[1][2], Cell::Number(472.0));
    }

    #[test]
    fn test_truncated_parquet_is_malformed() {
        let mut bytes = write_parquet(&price_batch());
        bytes.truncate(bytes.len() / 2);

        let err = read_parquet_bytes(Bytes::from(bytes)).unwrap_err();
        assert!(matches!(err, crate::ValidationError::Malformed(_)));
    }

    #[test]
    fn test_magic_detection() {
        assert!(!is_parquet(b"Date,Symbol,Px\n"));
        assert!(!is_parquet(b"PAR1"));
    }
}
