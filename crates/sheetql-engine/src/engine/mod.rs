//! SQL over JSON rows with pluggable FROM/INTO sources and functions.

pub mod ast;
mod eval;
mod expr;
mod hooks;
pub mod lexer;
pub mod parser;
mod preprocess;
mod rows;
pub mod value;

pub use eval::{SqlEngine, shared};
pub use hooks::{AggregateFn, FromHook, FunctionHook, IntoHook, ScalarFn};
pub use preprocess::{UNIQUE_ID_PLACEHOLDER, substitute_unique_id, substitute_with};
pub use rows::{QueryOutput, Row, RowSet};
