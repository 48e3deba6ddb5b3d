//! Global extension tables: FROM sources, INTO targets and functions.
//!
//! Tables are only written while installing hooks; evaluation clones the
//! `Arc` out of the table and releases the lock before calling it, so hooks
//! may re-enter the engine (e.g. a FROM source that runs a sub-query).

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::rows::RowSet;
use crate::error::HookError;

/// Produces rows for `FROM NAME(args)`.
pub type FromHook = Arc<dyn Fn(&[Value]) -> Result<RowSet, HookError> + Send + Sync>;

/// Consumes rows for `INTO NAME(args)`; returns how many rows were written.
pub type IntoHook = Arc<dyn Fn(&[Value], &RowSet) -> Result<usize, HookError> + Send + Sync>;

/// Called once per row with the evaluated arguments.
pub type ScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value, HookError> + Send + Sync>;

/// Called once per group with the first argument's value for every row.
pub type AggregateFn = Arc<dyn Fn(&[Value]) -> Result<Value, HookError> + Send + Sync>;

#[derive(Clone)]
pub enum FunctionHook {
    Scalar(ScalarFn),
    Aggregate(AggregateFn),
}

impl FunctionHook {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, FunctionHook::Aggregate(_))
    }
}

#[derive(Default)]
pub(crate) struct HookTables {
    pub(crate) from: RwLock<HashMap<String, FromHook>>,
    pub(crate) into: RwLock<HashMap<String, IntoHook>>,
    pub(crate) functions: RwLock<HashMap<String, FunctionHook>>,
    /// Keys of one-time installs already performed.
    pub(crate) installed: Mutex<HashSet<String>>,
}

impl HookTables {
    pub(crate) fn from_hook(&self, name: &str) -> Option<FromHook> {
        self.from
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_uppercase())
            .cloned()
    }

    pub(crate) fn into_hook(&self, name: &str) -> Option<IntoHook> {
        self.into
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_uppercase())
            .cloned()
    }

    pub(crate) fn function(&self, name: &str) -> Option<FunctionHook> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_uppercase())
            .cloned()
    }
}
