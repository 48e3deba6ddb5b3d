//! Error types for sheetql core.

use sheetql_engine::EngineError;
use thiserror::Error;

/// Errors that can occur while caching, dispatching or running queries.
#[derive(Error, Debug)]
pub enum SheetqlError {
    #[error("Cache is not initialized")]
    NotInitialized,

    #[error("Cache is already initialized with prefix '{0}'")]
    AlreadyInitialized(String),

    #[error("No execution context is active")]
    MissingExecutionContext,

    #[error("FROM {table} belongs to {expected} but the active provider is {actual}")]
    InvalidFromMethod {
        table: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("INTO {table} belongs to {expected} but the active provider is {actual}")]
    InvalidIntoMethod {
        table: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Range '{0}' is empty")]
    EmptyRange(String),

    #[error("Range '{range}' has a blank header in column {column}")]
    BlankHeader { range: String, column: usize },

    #[error("Columns do not match range '{range}': missing {missing:?}, unexpected {unexpected:?}")]
    ColumnMismatch {
        range: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Unknown named range: {0}")]
    UnknownNamedRange(String),

    #[error("Invalid range reference: {0}")]
    InvalidRange(String),

    #[error("Rate fetch failed: {message}")]
    RateFetch { message: String, raw: String },

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query error: {0}")]
    Engine(#[source] EngineError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Rhai error: {0}")]
    Script(String),
}

impl SheetqlError {
    pub(crate) fn invalid_arg(function: &str, message: impl Into<String>) -> Self {
        SheetqlError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Hook failures come back boxed; unwrap ours so callers can match on them.
impl From<EngineError> for SheetqlError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Hook(inner) => match inner.downcast::<SheetqlError>() {
                Ok(typed) => *typed,
                Err(other) => SheetqlError::Engine(EngineError::Hook(other)),
            },
            other => SheetqlError::Engine(other),
        }
    }
}

impl From<rhai::ParseError> for SheetqlError {
    fn from(err: rhai::ParseError) -> Self {
        SheetqlError::Script(err.to_string())
    }
}

impl From<Box<rhai::EvalAltResult>> for SheetqlError {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        SheetqlError::Script(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SheetqlError>;
