//! Named SQL functions resolved at call time from a registry.
//!
//! The engine only ever sees one dispatch hook per function name; each call
//! looks the function object up in the registry of the active
//! [`ExecutionContext`](crate::query::ExecutionContext).

mod exchange;
mod median;
mod script;
mod window;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use sheetql_engine::engine::value::{as_number, to_text};

use crate::error::{Result, SheetqlError};

pub use exchange::{CachedRates, Exchange, RateSource, StaticRates};
pub use median::Median;
pub use script::{ScriptFunction, compile_script_functions, load_script_functions};
pub use window::{RowNumber, RunningSum};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// Called once per row with evaluated arguments.
    Scalar,
    /// Called once per group with the first argument for every row.
    Aggregate,
}

pub trait SheetFunction: Send + Sync {
    /// SQL-visible name, upper case.
    fn name(&self) -> &str;

    fn kind(&self) -> FunctionKind {
        FunctionKind::Scalar
    }

    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Function objects by upper-cased name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn SheetFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped functions: window accumulators, `MEDIAN` and `EXCHANGE`.
    pub fn with_defaults(rates: Arc<dyn RateSource>) -> Self {
        let mut registry = FunctionRegistry::new();
        registry.register(Arc::new(RunningSum));
        registry.register(Arc::new(RowNumber));
        registry.register(Arc::new(Median));
        registry.register(Arc::new(Exchange::new(rates)));
        registry
    }

    /// Add or replace a function under its name.
    ///
    /// Returns the function previously registered under that name.
    pub fn register(&mut self, function: Arc<dyn SheetFunction>) -> Option<Arc<dyn SheetFunction>> {
        let name = function.name().to_ascii_uppercase();
        let replaced = self.functions.insert(name.clone(), function);
        if replaced.is_some() {
            warn!(function = %name, "replacing previously registered function");
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SheetFunction>> {
        self.functions.get(&name.to_ascii_uppercase()).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SheetFunction>> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Numeric argument at `index`; `None` for SQL NULL.
pub(crate) fn number_arg(function: &str, args: &[Value], index: usize) -> Result<Option<f64>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => as_number(v).map(Some).ok_or_else(|| {
            SheetqlError::invalid_arg(function, format!("argument {} is not a number: {}", index + 1, v))
        }),
    }
}

/// Text argument at `index`, required.
pub(crate) fn text_arg(function: &str, args: &[Value], index: usize) -> Result<String> {
    match args.get(index) {
        None | Some(Value::Null) => Err(SheetqlError::invalid_arg(
            function,
            format!("argument {} is required", index + 1),
        )),
        Some(v) => Ok(to_text(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_registered_by_upper_name() {
        let registry = FunctionRegistry::with_defaults(Arc::new(StaticRates::new("USD")));
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["EXCHANGE", "MEDIAN", "ROW_NUMBER", "RUNNING_SUM"]);
        assert!(registry.get("median").is_some());
        assert_eq!(registry.get("MEDIAN").map(|f| f.kind()), Some(FunctionKind::Aggregate));
    }

    #[test]
    fn test_register_returns_replaced_function() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.register(Arc::new(Median)).is_none());
        let replaced = registry.register(Arc::new(Median));
        assert_eq!(replaced.map(|f| f.name().to_string()), Some("MEDIAN".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_argument_helpers() {
        let args = [json!("2.5"), json!(null), json!("x")];
        assert_eq!(number_arg("F", &args, 0).unwrap(), Some(2.5));
        assert_eq!(number_arg("F", &args, 1).unwrap(), None);
        assert_eq!(number_arg("F", &args, 9).unwrap(), None);
        assert!(number_arg("F", &args, 2).is_err());
        assert_eq!(text_arg("F", &args, 2).unwrap(), "x");
        assert!(text_arg("F", &args, 1).is_err());
    }
}
