//! SQL functions defined in Rhai scripts.
//!
//! Every public `fn` in a script becomes a scalar SQL function named after
//! it in upper case:
//!
//! ```rhai
//! fn margin(price, cost) { (price - cost) / price }
//! ```
//!
//! makes `SELECT MARGIN(price, cost) FROM ...` available.

use rhai::{AST, Dynamic, Engine, FnAccess, Scope};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use sheetql_engine::engine::value::number;

use super::SheetFunction;
use crate::error::{Result, SheetqlError};

/// One SQL name backed by every public script overload of that name.
///
/// Rhai overloads by parameter count, so the call is routed to the overload
/// whose arity matches the argument count.
pub struct ScriptFunction {
    sql_name: String,
    overloads: BTreeMap<usize, String>,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl ScriptFunction {
    /// Accepted argument counts, ascending.
    pub fn arities(&self) -> impl Iterator<Item = usize> + '_ {
        self.overloads.keys().copied()
    }
}

/// Compile `source` and wrap each public function name.
pub fn compile_script_functions(source: &str) -> Result<Vec<ScriptFunction>> {
    let engine = Arc::new(Engine::new());
    let ast = Arc::new(engine.compile(source)?);
    let mut grouped: BTreeMap<String, BTreeMap<usize, String>> = BTreeMap::new();
    for f in ast.iter_functions().filter(|f| f.access != FnAccess::Private) {
        grouped
            .entry(f.name.to_ascii_uppercase())
            .or_default()
            .insert(f.params.len(), f.name.to_string());
    }
    let functions = grouped
        .into_iter()
        .map(|(sql_name, overloads)| ScriptFunction {
            sql_name,
            overloads,
            engine: engine.clone(),
            ast: ast.clone(),
        })
        .collect();
    Ok(functions)
}

/// Read and compile a script file.
pub fn load_script_functions(path: &Path) -> Result<Vec<ScriptFunction>> {
    let source = std::fs::read_to_string(path)?;
    let functions = compile_script_functions(&source)
        .map_err(|e| SheetqlError::Script(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), count = functions.len(), "loaded script functions");
    Ok(functions)
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        // Spreadsheet numbers are floats; integers would make `/` truncate.
        Value::Number(n) => Dynamic::from(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from(items.iter().map(to_dynamic).collect::<rhai::Array>()),
        Value::Object(map) => {
            let mut out = rhai::Map::new();
            for (key, item) in map {
                out.insert(key.as_str().into(), to_dynamic(item));
            }
            Dynamic::from(out)
        }
    }
}

fn to_json(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return number(f);
    }
    if value.is_array() {
        return match value.into_array() {
            Ok(items) => Value::Array(items.into_iter().map(to_json).collect()),
            Err(_) => Value::Null,
        };
    }
    if value.is_map() {
        return match value.try_cast::<rhai::Map>() {
            Some(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k.to_string(), to_json(v)))
                    .collect::<Map<String, Value>>(),
            ),
            None => Value::Null,
        };
    }
    Value::String(value.to_string())
}

impl SheetFunction for ScriptFunction {
    fn name(&self) -> &str {
        &self.sql_name
    }

    fn call(&self, args: &[Value]) -> Result<Value> {
        let Some(fn_name) = self.overloads.get(&args.len()) else {
            let expected: Vec<String> = self.arities().map(|n| n.to_string()).collect();
            return Err(SheetqlError::invalid_arg(
                &self.sql_name,
                format!("expected {} arguments, got {}", expected.join(" or "), args.len()),
            ));
        };
        let mut scope = Scope::new();
        let args: Vec<Dynamic> = args.iter().map(to_dynamic).collect();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, fn_name, args)?;
        Ok(to_json(result))
    }
}
