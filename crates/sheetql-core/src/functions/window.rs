//! Window-style accumulators.
//!
//! State lives in the active execution context's scratch data, keyed by the
//! caller's window id and partition, so it disappears with the query. Pass
//! `@@UNIQUE_ID@@` as the window id to get a fresh window per evaluation:
//!
//! ```sql
//! SELECT day, RUNNING_SUM(@@UNIQUE_ID@@, account, amount) AS balance FROM ?
//! ```

use serde_json::Value;
use sheetql_engine::engine::value::{as_number, number, to_text};

use super::{SheetFunction, number_arg, text_arg};
use crate::error::{Result, SheetqlError};
use crate::query::ExecutionContext;

fn state_key(function: &str, args: &[Value]) -> Result<String> {
    let window = text_arg(function, args, 0)?;
    let partition = args.get(1).map(to_text).unwrap_or_default();
    Ok(format!("{}\u{1f}{}\u{1f}{}", function, window, partition))
}

fn check_args(function: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(SheetqlError::invalid_arg(
            function,
            format!("expected {} to {} arguments, got {}", min, max, args.len()),
        ));
    }
    Ok(())
}

/// `RUNNING_SUM(window_id, partition, value)`: sum of `value` over the
/// partition's rows so far. NULL values add nothing.
pub struct RunningSum;

impl SheetFunction for RunningSum {
    fn name(&self) -> &str {
        "RUNNING_SUM"
    }

    fn call(&self, args: &[Value]) -> Result<Value> {
        check_args(self.name(), args, 3, 3)?;
        let key = state_key(self.name(), args)?;
        let value = number_arg(self.name(), args, 2)?.unwrap_or(0.0);
        let ctx = ExecutionContext::current()?;
        let total = ctx.with_data(|data| {
            let total = data.get(&key).and_then(as_number).unwrap_or(0.0) + value;
            data.insert(key, number(total));
            total
        });
        Ok(number(total))
    }
}

/// `ROW_NUMBER(window_id [, partition])`: 1, 2, 3... per partition.
pub struct RowNumber;

impl SheetFunction for RowNumber {
    fn name(&self) -> &str {
        "ROW_NUMBER"
    }

    fn call(&self, args: &[Value]) -> Result<Value> {
        check_args(self.name(), args, 1, 2)?;
        let key = state_key(self.name(), args)?;
        let ctx = ExecutionContext::current()?;
        let next = ctx.with_data(|data| {
            let next = data.get(&key).and_then(Value::as_u64).unwrap_or(0) + 1;
            data.insert(key, Value::from(next));
            next
        });
        Ok(Value::from(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::query::context::execute;
    use crate::query::registration::{QueryableProvider, TableMethods};
    use serde_json::json;
    use std::sync::Arc;

    struct Nothing;

    impl QueryableProvider for Nothing {
        const PROVIDER_TYPE: &'static str = "Nothing";

        fn table_methods() -> TableMethods<Self> {
            TableMethods::new()
        }
    }

    fn in_context<R>(work: impl FnOnce() -> R) -> R {
        execute(Arc::new(Nothing), Arc::new(FunctionRegistry::new()), work)
    }

    #[test]
    fn test_running_sum_per_partition() {
        in_context(|| {
            let call = |p: &str, v: Value| RunningSum.call(&[json!("w"), json!(p), v]).unwrap();
            assert_eq!(call("a", json!(1)), json!(1));
            assert_eq!(call("b", json!(10)), json!(10));
            assert_eq!(call("a", json!(2.5)), json!(3.5));
            assert_eq!(call("a", json!(null)), json!(3.5));
        });
    }

    #[test]
    fn test_state_does_not_survive_the_context() {
        let first = in_context(|| RowNumber.call(&[json!("w")]).unwrap());
        let second = in_context(|| {
            RowNumber.call(&[json!("w")]).unwrap();
            RowNumber.call(&[json!("w")]).unwrap()
        });
        assert_eq!(first, json!(1));
        assert_eq!(second, json!(2));
    }

    #[test]
    fn test_windows_are_independent() {
        in_context(|| {
            assert_eq!(RowNumber.call(&[json!("w1"), json!("p")]).unwrap(), json!(1));
            assert_eq!(RowNumber.call(&[json!("w2"), json!("p")]).unwrap(), json!(1));
            assert_eq!(RowNumber.call(&[json!("w1"), json!("p")]).unwrap(), json!(2));
        });
    }

    #[test]
    fn test_requires_a_context_and_window_id() {
        assert!(matches!(
            RowNumber.call(&[json!("w")]),
            Err(SheetqlError::MissingExecutionContext)
        ));
        in_context(|| {
            assert!(RowNumber.call(&[json!(null)]).is_err());
            assert!(RunningSum.call(&[json!("w"), json!("p")]).is_err());
        });
    }
}
