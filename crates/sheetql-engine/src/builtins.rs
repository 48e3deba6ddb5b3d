//! Built-in SQL functions and their metadata.
//!
//! Conventions:
//! - Function names are matched case-insensitively and stored ALL CAPS.
//! - Scalar built-ins are listed in `SCALAR_BUILTINS` (arity is checked
//!   before dispatch) and implemented in `call_scalar`.
//! - Aggregates are listed in `AGGREGATE_BUILTINS` and implemented in
//!   `call_aggregate`.
//! - Functions installed through the engine's function table shadow these.

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use crate::engine::value::{as_number, number, to_text, total_cmp};
use crate::error::{EngineError, Result};

pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    #[allow(dead_code)]
    pub description: &'static str,
}

pub const SCALAR_BUILTINS: &[Builtin] = &[
    Builtin {
        name: "UPPER",
        min_args: 1,
        max_args: Some(1),
        description: "Upper-case text",
    },
    Builtin {
        name: "LOWER",
        min_args: 1,
        max_args: Some(1),
        description: "Lower-case text",
    },
    Builtin {
        name: "LEN",
        min_args: 1,
        max_args: Some(1),
        description: "Length of text in characters",
    },
    Builtin {
        name: "LENGTH",
        min_args: 1,
        max_args: Some(1),
        description: "Alias of LEN",
    },
    Builtin {
        name: "TRIM",
        min_args: 1,
        max_args: Some(1),
        description: "Strip surrounding whitespace",
    },
    Builtin {
        name: "ABS",
        min_args: 1,
        max_args: Some(1),
        description: "Absolute value",
    },
    Builtin {
        name: "ROUND",
        min_args: 1,
        max_args: Some(2),
        description: "Round to the given number of decimals (default 0)",
    },
    Builtin {
        name: "FLOOR",
        min_args: 1,
        max_args: Some(1),
        description: "Round down",
    },
    Builtin {
        name: "CEIL",
        min_args: 1,
        max_args: Some(1),
        description: "Round up",
    },
    Builtin {
        name: "COALESCE",
        min_args: 1,
        max_args: None,
        description: "First non-null argument",
    },
    Builtin {
        name: "IFNULL",
        min_args: 2,
        max_args: Some(2),
        description: "Second argument when the first is null",
    },
    Builtin {
        name: "IIF",
        min_args: 3,
        max_args: Some(3),
        description: "Second argument when the first is truthy, else the third",
    },
    Builtin {
        name: "CONCAT",
        min_args: 1,
        max_args: None,
        description: "Concatenate arguments as text",
    },
    Builtin {
        name: "SUBSTR",
        min_args: 2,
        max_args: Some(3),
        description: "Substring from a 1-based start, optionally limited in length",
    },
    Builtin {
        name: "REPLACE",
        min_args: 3,
        max_args: Some(3),
        description: "Replace every occurrence of a substring",
    },
    Builtin {
        name: "NOW",
        min_args: 0,
        max_args: Some(0),
        description: "Current UTC time as RFC 3339 text",
    },
    Builtin {
        name: "RANDOM",
        min_args: 0,
        max_args: Some(0),
        description: "Random number in [0, 1)",
    },
];

pub const AGGREGATE_BUILTINS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "FIRST", "LAST"];

pub fn scalar_builtin(name: &str) -> Option<&'static Builtin> {
    SCALAR_BUILTINS.iter().find(|b| b.name == name)
}

pub fn is_aggregate_builtin(name: &str) -> bool {
    AGGREGATE_BUILTINS.contains(&name)
}

fn check_arity(builtin: &Builtin, count: usize) -> Result<()> {
    let too_many = builtin.max_args.is_some_and(|max| count > max);
    if count < builtin.min_args || too_many {
        let expected = match builtin.max_args {
            Some(max) if max == builtin.min_args => format!("{}", max),
            Some(max) => format!("{} to {}", builtin.min_args, max),
            None => format!("at least {}", builtin.min_args),
        };
        return Err(EngineError::invalid_arg(
            builtin.name,
            format!("expected {} arguments, got {}", expected, count),
        ));
    }
    Ok(())
}

fn numeric_arg(name: &str, value: &Value) -> Result<Option<f64>> {
    if value.is_null() {
        return Ok(None);
    }
    as_number(value)
        .map(Some)
        .ok_or_else(|| EngineError::invalid_arg(name, format!("{} is not a number", value)))
}

fn map_number(name: &str, value: &Value, f: impl Fn(f64) -> f64) -> Result<Value> {
    Ok(numeric_arg(name, value)?
        .map(|n| number(f(n)))
        .unwrap_or(Value::Null))
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    if value.is_null() {
        Value::Null
    } else {
        Value::String(f(&to_text(value)))
    }
}

/// Call a scalar built-in. Returns `UnknownFunction` when `name` is not one.
pub fn call_scalar(name: &str, args: &[Value]) -> Result<Value> {
    let Some(builtin) = scalar_builtin(name) else {
        return Err(EngineError::UnknownFunction(name.to_string()));
    };
    check_arity(builtin, args.len())?;

    match name {
        "UPPER" => Ok(map_text(&args[0], |s| s.to_uppercase())),
        "LOWER" => Ok(map_text(&args[0], |s| s.to_lowercase())),
        "LEN" | "LENGTH" => Ok(if args[0].is_null() {
            Value::Null
        } else {
            Value::from(to_text(&args[0]).chars().count())
        }),
        "TRIM" => Ok(map_text(&args[0], |s| s.trim().to_string())),
        "ABS" => map_number(name, &args[0], f64::abs),
        "ROUND" => {
            let decimals = match args.get(1) {
                Some(d) => numeric_arg(name, d)?.unwrap_or(0.0),
                None => 0.0,
            };
            let factor = 10f64.powi(decimals as i32);
            map_number(name, &args[0], |n| (n * factor).round() / factor)
        }
        "FLOOR" => map_number(name, &args[0], f64::floor),
        "CEIL" => map_number(name, &args[0], f64::ceil),
        "COALESCE" => Ok(args.iter().find(|a| !a.is_null()).cloned().unwrap_or(Value::Null)),
        "IFNULL" => Ok(if args[0].is_null() {
            args[1].clone()
        } else {
            args[0].clone()
        }),
        "IIF" => Ok(if crate::engine::value::truthy(&args[0]) {
            args[1].clone()
        } else {
            args[2].clone()
        }),
        "CONCAT" => Ok(Value::String(args.iter().map(to_text).collect())),
        "SUBSTR" => {
            if args[0].is_null() {
                return Ok(Value::Null);
            }
            let text = to_text(&args[0]);
            let start = numeric_arg(name, &args[1])?.unwrap_or(1.0).max(1.0) as usize - 1;
            let chars = text.chars().skip(start);
            let out: String = match args.get(2) {
                Some(len) => {
                    let len = numeric_arg(name, len)?.unwrap_or(0.0).max(0.0) as usize;
                    chars.take(len).collect()
                }
                None => chars.collect(),
            };
            Ok(Value::String(out))
        }
        "REPLACE" => {
            if args[0].is_null() {
                return Ok(Value::Null);
            }
            let from = to_text(&args[1]);
            if from.is_empty() {
                return Ok(Value::String(to_text(&args[0])));
            }
            Ok(Value::String(
                to_text(&args[0]).replace(&from, &to_text(&args[2])),
            ))
        }
        "NOW" => Ok(Value::String(Utc::now().to_rfc3339())),
        "RANDOM" => Ok(number(rand::thread_rng().gen_range(0.0..1.0))),
        _ => Err(EngineError::UnknownFunction(name.to_string())),
    }
}

/// Call an aggregate built-in over one group.
///
/// `values` holds the argument evaluated for every row of the group;
/// `rows` is the group size, used by `COUNT(*)`.
pub fn call_aggregate(name: &str, values: &[Value], rows: usize, star: bool) -> Result<Value> {
    let present = || values.iter().filter(|v| !v.is_null());
    match name {
        "COUNT" if star => Ok(Value::from(rows)),
        "COUNT" => Ok(Value::from(present().count())),
        "SUM" => {
            let mut total = 0.0;
            for v in present() {
                total += numeric_arg(name, v)?.unwrap_or(0.0);
            }
            Ok(number(total))
        }
        "AVG" => {
            let mut total = 0.0;
            let mut count = 0usize;
            for v in present() {
                total += numeric_arg(name, v)?.unwrap_or(0.0);
                count += 1;
            }
            Ok(if count == 0 {
                Value::Null
            } else {
                number(total / count as f64)
            })
        }
        "MIN" => Ok(present().min_by(|a, b| total_cmp(a, b)).cloned().unwrap_or(Value::Null)),
        "MAX" => Ok(present().max_by(|a, b| total_cmp(a, b)).cloned().unwrap_or(Value::Null)),
        "FIRST" => Ok(values.first().cloned().unwrap_or(Value::Null)),
        "LAST" => Ok(values.last().cloned().unwrap_or(Value::Null)),
        _ => Err(EngineError::UnknownFunction(name.to_string())),
    }
}
