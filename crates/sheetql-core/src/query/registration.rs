//! One-time installation of provider tables and functions into the engine.
//!
//! Each provider type declares its FROM/INTO tables as a static method
//! table. Installing a type registers one engine hook per table name; the
//! hook does not capture any provider instance. At call time it takes the
//! provider from the active [`ExecutionContext`], checks that it is of the
//! declaring type, and runs the method on it. Functions are installed once
//! per name and resolved through the context's function registry.

use serde_json::Value;
use sheetql_engine::{FunctionHook, HookError, RowSet, SqlEngine};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use super::context::ExecutionContext;
use crate::error::{Result, SheetqlError};
use crate::functions::{FunctionKind, FunctionRegistry};

/// Reads rows for `FROM NAME(args)`.
pub type FromMethod<P> = fn(&P, &[Value]) -> Result<RowSet>;

/// Writes rows for `INTO NAME(args)`; returns the number written.
pub type IntoMethod<P> = fn(&P, &[Value], &RowSet) -> Result<usize>;

/// Static table of a provider type's SQL-visible methods.
pub struct TableMethods<P> {
    from: Vec<(&'static str, FromMethod<P>)>,
    into: Vec<(&'static str, IntoMethod<P>)>,
}

impl<P> Default for TableMethods<P> {
    fn default() -> Self {
        TableMethods {
            from: Vec::new(),
            into: Vec::new(),
        }
    }
}

impl<P> TableMethods<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_from(mut self, table: &'static str, method: FromMethod<P>) -> Self {
        self.from.push((table, method));
        self
    }

    pub fn with_into(mut self, table: &'static str, method: IntoMethod<P>) -> Self {
        self.into.push((table, method));
        self
    }

    pub fn from_tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.from.iter().map(|(name, _)| *name)
    }

    pub fn into_tables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.into.iter().map(|(name, _)| *name)
    }
}

/// A provider instance as seen through the execution context.
pub trait Provider: Send + Sync + 'static {
    fn provider_type(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// A provider type whose tables can be queried through the shared engine.
pub trait QueryableProvider: Send + Sync + Sized + 'static {
    /// Tag compared against the active provider before dispatch.
    const PROVIDER_TYPE: &'static str;

    fn table_methods() -> TableMethods<Self>;
}

impl<P: QueryableProvider> Provider for P {
    fn provider_type(&self) -> &'static str {
        P::PROVIDER_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn hook_error(err: SheetqlError) -> HookError {
    Box::new(err)
}

#[derive(Clone, Copy)]
enum Direction {
    From,
    Into,
}

/// Run `f` against the active provider if it is a `P`.
fn with_active<P, R>(table: &str, direction: Direction, f: impl FnOnce(&P) -> Result<R>) -> Result<R>
where
    P: QueryableProvider,
{
    let provider = ExecutionContext::current()?.provider();
    let mismatch = || match direction {
        Direction::From => SheetqlError::InvalidFromMethod {
            table: table.to_string(),
            expected: P::PROVIDER_TYPE,
            actual: provider.provider_type(),
        },
        Direction::Into => SheetqlError::InvalidIntoMethod {
            table: table.to_string(),
            expected: P::PROVIDER_TYPE,
            actual: provider.provider_type(),
        },
    };
    if provider.provider_type() != P::PROVIDER_TYPE {
        return Err(mismatch());
    }
    let typed = provider.as_any().downcast_ref::<P>().ok_or_else(mismatch)?;
    f(typed)
}

/// Install `P`'s tables into `engine`. Later calls for the same type are no-ops.
///
/// Returns whether this call did the install.
pub fn install_provider<P: QueryableProvider>(engine: &SqlEngine) -> bool {
    let key = format!("provider:{}", P::PROVIDER_TYPE);
    engine.install_once(&key, |engine| {
        let methods = P::table_methods();
        for (table, method) in methods.from {
            debug!(provider = P::PROVIDER_TYPE, table, "installing FROM table");
            engine.register_from(table, move |args| {
                with_active::<P, _>(table, Direction::From, |p| method(p, args)).map_err(hook_error)
            });
        }
        for (table, method) in methods.into {
            debug!(provider = P::PROVIDER_TYPE, table, "installing INTO table");
            engine.register_into(table, move |args, rows| {
                with_active::<P, _>(table, Direction::Into, |p| method(p, args, rows))
                    .map_err(hook_error)
            });
        }
    })
}

fn call_function(name: &str, args: &[Value]) -> Result<Value> {
    let function = ExecutionContext::current()?
        .functions()
        .get(name)
        .ok_or_else(|| SheetqlError::UnknownFunction(name.to_string()))?;
    function.call(args)
}

/// Install a dispatch hook for every function in `registry` not yet known
/// to `engine`. Returns how many hooks were installed.
pub fn install_functions(engine: &SqlEngine, registry: &FunctionRegistry) -> usize {
    let mut installed = 0;
    for function in registry.iter() {
        let name = function.name().to_ascii_uppercase();
        let kind = function.kind();
        let key = format!("function:{}", name);
        let did_install = engine.install_once(&key, |engine| {
            let dispatch_name = name.clone();
            let dispatch = move |args: &[Value]| -> std::result::Result<Value, HookError> {
                call_function(&dispatch_name, args).map_err(hook_error)
            };
            let hook = match kind {
                FunctionKind::Scalar => FunctionHook::Scalar(Arc::new(dispatch)),
                FunctionKind::Aggregate => FunctionHook::Aggregate(Arc::new(dispatch)),
            };
            engine.register_function(&name, hook);
        });
        if did_install {
            installed += 1;
        }
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::context::execute;
    use serde_json::json;
    use sheetql_engine::{EngineError, QueryOutput};

    struct Alpha {
        label: &'static str,
    }

    impl Alpha {
        fn read(&self, _args: &[Value]) -> Result<RowSet> {
            let row = json!({"label": self.label}).as_object().cloned().unwrap_or_default();
            Ok(RowSet::from_rows(vec![row]))
        }

        fn write(&self, _args: &[Value], rows: &RowSet) -> Result<usize> {
            Ok(rows.len())
        }
    }

    impl QueryableProvider for Alpha {
        const PROVIDER_TYPE: &'static str = "Alpha";

        fn table_methods() -> TableMethods<Self> {
            TableMethods::new()
                .with_from("ALPHA", Alpha::read)
                .with_into("ALPHA", Alpha::write)
        }
    }

    struct Beta;

    impl QueryableProvider for Beta {
        const PROVIDER_TYPE: &'static str = "Beta";

        fn table_methods() -> TableMethods<Self> {
            TableMethods::new()
        }
    }

    fn run<P: QueryableProvider, R>(provider: P, work: impl FnOnce() -> R) -> R {
        execute(Arc::new(provider), Arc::new(FunctionRegistry::new()), work)
    }

    #[test]
    fn test_install_is_idempotent_per_type() {
        let engine = SqlEngine::new();
        assert!(install_provider::<Alpha>(&engine));
        assert!(!install_provider::<Alpha>(&engine));
        assert!(install_provider::<Beta>(&engine));
        assert!(engine.has_from("alpha"));
        assert!(engine.has_into("ALPHA"));
    }

    #[test]
    fn test_hook_dispatches_to_active_instance() {
        let engine = SqlEngine::new();
        install_provider::<Alpha>(&engine);
        for label in ["one", "two"] {
            let out = run(Alpha { label }, || engine.evaluate("SELECT label FROM ALPHA()", &Value::Null))
                .unwrap()
                .and_then(QueryOutput::into_rows)
                .unwrap();
            assert_eq!(out.rows[0]["label"], json!(label));
        }
    }

    #[test]
    fn test_wrong_provider_type_is_rejected() {
        let engine = SqlEngine::new();
        install_provider::<Alpha>(&engine);
        let err: SheetqlError = run(Beta, || engine.evaluate("SELECT * FROM ALPHA()", &Value::Null))
            .unwrap_err()
            .into();
        assert!(matches!(
            err,
            SheetqlError::InvalidFromMethod { expected: "Alpha", actual: "Beta", .. }
        ));
        let err: SheetqlError = run(Beta, || engine.evaluate("SELECT 1 INTO ALPHA()", &Value::Null))
            .unwrap_err()
            .into();
        assert!(matches!(err, SheetqlError::InvalidIntoMethod { .. }));
    }

    #[test]
    fn test_hook_without_context_fails_loudly() {
        let engine = SqlEngine::new();
        install_provider::<Alpha>(&engine);
        let err = engine.evaluate("SELECT * FROM ALPHA()", &Value::Null).unwrap_err();
        assert!(matches!(
            SheetqlError::from(err),
            SheetqlError::MissingExecutionContext
        ));
    }

    struct Plus;

    impl crate::functions::SheetFunction for Plus {
        fn name(&self) -> &str {
            "plus_one"
        }

        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(json!(args[0].as_i64().unwrap_or(0) + 1))
        }
    }

    #[test]
    fn test_functions_resolve_through_the_context_registry() {
        let engine = SqlEngine::new();
        let mut registry = FunctionRegistry::new();
        registry.register(Arc::new(Plus));
        assert_eq!(install_functions(&engine, &registry), 1);
        assert_eq!(install_functions(&engine, &registry), 0);

        let out = execute(Arc::new(Beta), Arc::new(registry), || {
            engine.evaluate("SELECT PLUS_ONE(41) AS x", &Value::Null)
        })
        .unwrap()
        .and_then(QueryOutput::into_rows)
        .unwrap();
        assert_eq!(out.rows[0]["x"], json!(42));

        // Installed, but the active registry does not know it.
        let err = run(Beta, || engine.evaluate("SELECT PLUS_ONE(1)", &Value::Null)).unwrap_err();
        assert!(matches!(
            SheetqlError::from(err),
            SheetqlError::UnknownFunction(name) if name == "PLUS_ONE"
        ));
        assert!(matches!(
            engine.evaluate("SELECT nothing_here(1)", &Value::Null),
            Err(EngineError::UnknownFunction(_))
        ));
    }
}
