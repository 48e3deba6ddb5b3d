//! sheetql_engine - SQL-over-rows evaluator with pluggable hook tables.

pub mod builtins;
pub mod engine;
pub mod error;

pub use engine::{
    AggregateFn, FromHook, FunctionHook, IntoHook, QueryOutput, Row, RowSet, ScalarFn,
    SqlEngine, UNIQUE_ID_PLACEHOLDER, shared, substitute_unique_id,
};
pub use error::{EngineError, HookError, Result};
