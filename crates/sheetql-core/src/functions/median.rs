//! `MEDIAN(value)` aggregate.

use serde_json::Value;
use sheetql_engine::engine::value::{as_number, number};

use super::{FunctionKind, SheetFunction};
use crate::error::Result;

pub struct Median;

impl SheetFunction for Median {
    fn name(&self) -> &str {
        "MEDIAN"
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Aggregate
    }

    /// Median of the numeric values; nulls and non-numbers are ignored.
    fn call(&self, values: &[Value]) -> Result<Value> {
        let mut nums: Vec<f64> = values
            .iter()
            .filter(|v| !v.is_null())
            .filter_map(as_number)
            .collect();
        if nums.is_empty() {
            return Ok(Value::Null);
        }
        nums.sort_by(f64::total_cmp);
        let mid = nums.len() / 2;
        let median = if nums.len() % 2 == 0 {
            (nums[mid - 1] + nums[mid]) / 2.0
        } else {
            nums[mid]
        };
        Ok(number(median))
    }
}
