//! Row and result-set types exchanged with hooks and callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row, keyed by column name.
pub type Row = Map<String, Value>;

/// Rows plus the column order they should be presented in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        RowSet { columns, rows }
    }

    /// Build a row set whose columns are every key seen across `rows`,
    /// in first-seen order.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        RowSet { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append another set's rows, adding any columns this set does not have yet.
    pub fn extend(&mut self, other: RowSet) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.rows.extend(other.rows);
    }

    /// Values of one column, `Null` where a row lacks it.
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// What a statement produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryOutput {
    /// Rows from a plain SELECT.
    Rows(RowSet),
    /// Number of rows handed to an INTO target.
    Count(usize),
}

impl QueryOutput {
    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Count(_) => None,
        }
    }

    pub fn into_rows(self) -> Option<RowSet> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Count(_) => None,
        }
    }
}
