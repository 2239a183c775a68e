use std::fmt;

use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Alignment key for rows coming from different metric collections.
///
/// Timestamp keys order before row-index keys, so a table mixing both kinds
/// still sorts deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JoinKey {
    Timestamp(OffsetDateTime),
    RowIndex(u64),
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Column name used for a collection's values once merged.
pub fn value_column(collection: &str) -> String {
    format!("{}_value", collection.replace('-', "_"))
}

/// A single exported/displayed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Missing,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub key: JoinKey,
    pub device_name: Option<String>,
    /// One slot per entry of [`MergedTable::value_columns`]; `None` means the
    /// collection had no reading at this key.
    pub values: Vec<Option<f64>>,
}

/// Row-aligned union of every metric collection for one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedTable {
    pub value_columns: Vec<String>,
    pub rows: Vec<MergedRow>,
}

impl MergedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn key_column(&self) -> &'static str {
        let timestamps = self
            .rows
            .iter()
            .filter(|r| matches!(r.key, JoinKey::Timestamp(_)))
            .count();
        if timestamps == self.rows.len() {
            "timestamp"
        } else if timestamps == 0 {
            "row_index"
        } else {
            "join_key"
        }
    }

    pub fn has_device_name(&self) -> bool {
        self.rows.iter().any(|r| r.device_name.is_some())
    }

    /// Header row: key column, optional `device_name`, then value columns.
    pub fn column_names(&self) -> Vec<String> {
        let mut cols = Vec::with_capacity(self.value_columns.len() + 2);
        cols.push(self.key_column().to_string());
        if self.has_device_name() {
            cols.push("device_name".to_string());
        }
        cols.extend(self.value_columns.iter().cloned());
        cols
    }

    /// Value of `column` at `row`, if the column exists and had a reading.
    pub fn value(&self, row: &MergedRow, column: &str) -> Option<f64> {
        let idx = self.value_columns.iter().position(|c| c == column)?;
        row.values.get(idx).copied().flatten()
    }

    /// Cells of one row in [`column_names`](Self::column_names) order.
    pub fn cells(&self, row: &MergedRow) -> Vec<Cell> {
        let mut cells = Vec::with_capacity(self.value_columns.len() + 2);
        cells.push(match row.key {
            JoinKey::Timestamp(ts) => Cell::Text(format_timestamp(ts)),
            JoinKey::RowIndex(idx) => Cell::Number(idx as f64),
        });
        if self.has_device_name() {
            cells.push(match &row.device_name {
                Some(name) => Cell::Text(name.clone()),
                None => Cell::Missing,
            });
        }
        cells.extend(row.values.iter().map(|v| match v {
            Some(v) => Cell::Number(*v),
            None => Cell::Missing,
        }));
        cells
    }

    /// Keeps only the first row (the oldest key after the ascending sort).
    pub fn first_row_only(mut self) -> Self {
        self.rows.truncate(1);
        self
    }

    /// Rows of a zero-based page; out-of-range pages are empty.
    pub fn page(&self, page: usize, page_size: usize) -> &[MergedRow] {
        if page_size == 0 {
            return &[];
        }
        let start = page.saturating_mul(page_size).min(self.rows.len());
        let end = start.saturating_add(page_size).min(self.rows.len());
        &self.rows[start..end]
    }
}
