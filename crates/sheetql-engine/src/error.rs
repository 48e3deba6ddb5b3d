//! Error types for the sheetql engine.

use thiserror::Error;

/// Error type carried back out of FROM/INTO/function hooks.
///
/// Hooks live in other crates, so their errors travel boxed and are
/// downcast again by whoever installed the hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while parsing or evaluating a query.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Unknown FROM source: {0}")]
    UnknownFrom(String),

    #[error("Unknown INTO target: {0}")]
    UnknownInto(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown table alias: {0}")]
    UnknownAlias(String),

    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Missing query parameter: {0}")]
    MissingParameter(String),

    #[error("Parameter {0} is not an array of rows")]
    NotRowArray(String),

    #[error("Aggregate {0} cannot be used here")]
    MisplacedAggregate(String),

    #[error("{0}")]
    Hook(#[source] HookError),
}

impl EngineError {
    pub(crate) fn invalid_arg(function: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
