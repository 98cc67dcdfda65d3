//! Untyped tabular input.
//!
//! A [`RawTable`] is exactly what the caller uploaded: a header row and
//! loosely typed cells. Nothing here is validated; coercion happens in the
//! normalizer, one row at a time.

use serde::{Deserialize, Serialize};

/// A single loosely typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Missing value (`null` or an empty field)
    Null,
    /// Numeric value
    Number(f64),
    /// Free text
    Text(String),
}

impl Cell {
    /// Build a cell from delimited-text input. Blank fields become [`Cell::Null`].
    pub fn from_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            Cell::Null
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    /// Whether the cell carries no value.
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::from_field(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

/// Header plus rows of loosely typed cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Column names as supplied
    pub columns: Vec<String>,
    /// Data rows; rows may be shorter or longer than `columns`
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    /// Create an empty table with the given header.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Builder-style row append.
    pub fn with_row(mut self, row: Vec<Cell>) -> Self {
        self.rows.push(row);
        self
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a column index by name, ignoring case and surrounding whitespace.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(name.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_deserialization() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[null, 1.5, "2024-01-01", 3]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Null,
                Cell::Number(1.5),
                Cell::Text("2024-01-01".into()),
                Cell::Number(3.0),
            ]
        );
    }

    #[test]
    fn test_blank_field_is_null() {
        assert_eq!(Cell::from_field("   "), Cell::Null);
        assert!(Cell::Text(" ".into()).is_null());
        assert!(!Cell::Number(0.0).is_null());
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = RawTable::new(["Date", " SYMBOL ", "px"]);
        assert_eq!(table.column_index("date"), Some(0));
        assert_eq!(table.column_index("Symbol"), Some(1));
        assert_eq!(table.column_index("PX"), Some(2));
        assert_eq!(table.column_index("volume"), None);
    }
}
