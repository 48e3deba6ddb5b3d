use dashmap::DashMap;
use serde_json::Value;
use sheetql_engine::RowSet;
use std::sync::Arc;
use tracing::debug;

use super::{flag, table_name};
use crate::error::Result;
use crate::query::{QueryableProvider, TableMethods};

/// Named in-memory tables: `FROM MEMORY('t')` and
/// `INTO MEMORY('t' [, {append: true}])`.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    tables: Arc<DashMap<String, RowSet>>,
}

impl MemoryProvider {
    pub const TABLE: &'static str = "MEMORY";

    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a table; unknown tables are empty.
    pub fn table(&self, name: &str) -> RowSet {
        self.tables
            .get(name)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }

    /// Replace a table.
    pub fn insert(&self, name: &str, rows: RowSet) {
        self.tables.insert(name.to_string(), rows);
    }

    /// Replace or extend a table; returns how many rows were written.
    pub fn write(&self, name: &str, rows: &RowSet, append: bool) -> usize {
        let mut table = self.tables.entry(name.to_string()).or_default();
        if append {
            table.extend(rows.clone());
        } else {
            *table = rows.clone();
        }
        debug!(table = name, rows = rows.len(), append, "memory table written");
        rows.len()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn from_memory(&self, args: &[Value]) -> Result<RowSet> {
        Ok(self.table(&table_name(Self::TABLE, args)?))
    }

    fn into_memory(&self, args: &[Value], rows: &RowSet) -> Result<usize> {
        let name = table_name(Self::TABLE, args)?;
        Ok(self.write(&name, rows, flag(args, 1, "append")))
    }
}

impl QueryableProvider for MemoryProvider {
    const PROVIDER_TYPE: &'static str = "MemoryProvider";

    fn table_methods() -> TableMethods<Self> {
        TableMethods::new()
            .with_from(Self::TABLE, MemoryProvider::from_memory)
            .with_into(Self::TABLE, MemoryProvider::into_memory)
    }
}
