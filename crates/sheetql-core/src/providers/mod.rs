//! Concrete providers exposing SQL tables.

mod memory;
mod named_range;

pub use memory::MemoryProvider;
pub use named_range::NamedRangeProvider;

use serde_json::Value;

use crate::error::{Result, SheetqlError};
use sheetql_engine::engine::value::truthy;

/// The table name every provider table takes as its first argument.
fn table_name(table: &str, args: &[Value]) -> Result<String> {
    match args.first() {
        Some(Value::String(name)) if !name.is_empty() => Ok(name.clone()),
        Some(other) => Err(SheetqlError::invalid_arg(
            table,
            format!("expected a table name, got {}", other),
        )),
        None => Err(SheetqlError::invalid_arg(table, "a table name is required")),
    }
}

/// Truthiness of `option` in an optional trailing options object.
fn flag(args: &[Value], index: usize, option: &str) -> bool {
    args.get(index)
        .and_then(|options| options.get(option))
        .is_some_and(truthy)
}
