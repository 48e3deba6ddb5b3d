//! Expression evaluation against joined rows and groups.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::SqlEngine;
use super::ast::{BinaryOp, Expr, ParamRef, UnaryOp};
use super::hooks::FunctionHook;
use super::rows::Row;
use super::value::{
    as_number, bool_or_null, like, number, sql_cmp, sql_eq, to_text, truthy,
};
use crate::builtins::{call_aggregate, call_scalar, is_aggregate_builtin};
use crate::error::{EngineError, Result};

/// One combined row: a row per FROM/JOIN source, tagged with the source alias.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tuple {
    pub(crate) bindings: Vec<(String, Row)>,
}

impl Tuple {
    pub(crate) fn single(alias: String, row: Row) -> Self {
        Tuple {
            bindings: vec![(alias, row)],
        }
    }

    pub(crate) fn with(&self, alias: String, row: Row) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.push((alias, row));
        Tuple { bindings }
    }

    pub(crate) fn binding(&self, alias: &str) -> Option<&Row> {
        self.bindings
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(alias))
            .map(|(_, row)| row)
    }

    fn lookup(&self, table: Option<&str>, name: &str) -> Result<Option<Value>> {
        match table {
            Some(alias) => {
                let row = self
                    .binding(alias)
                    .ok_or_else(|| EngineError::UnknownAlias(alias.to_string()))?;
                Ok(Some(row.get(name).cloned().unwrap_or(Value::Null)))
            }
            None => Ok(self
                .bindings
                .iter()
                .find_map(|(_, row)| row.get(name))
                .cloned()),
        }
    }
}

/// What an expression can see: one tuple, or every tuple of a group.
///
/// `output` is the projected row, consulted first for unqualified names so
/// HAVING and ORDER BY can refer to SELECT aliases.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub(crate) tuples: &'a [Tuple],
    pub(crate) grouped: bool,
    pub(crate) output: Option<&'a Row>,
}

impl<'a> Scope<'a> {
    pub(crate) fn empty() -> Self {
        Scope {
            tuples: &[],
            grouped: false,
            output: None,
        }
    }

    pub(crate) fn row(tuple: &'a Tuple) -> Self {
        Scope {
            tuples: std::slice::from_ref(tuple),
            grouped: false,
            output: None,
        }
    }

    pub(crate) fn unit(tuples: &'a [Tuple], grouped: bool) -> Self {
        Scope {
            tuples,
            grouped,
            output: None,
        }
    }

    pub(crate) fn with_output(self, output: &'a Row) -> Self {
        Scope {
            output: Some(output),
            ..self
        }
    }

    pub(crate) fn first(&self) -> Option<&'a Tuple> {
        self.tuples.first()
    }
}

pub(crate) struct Evaluator<'e> {
    pub(crate) engine: &'e SqlEngine,
    pub(crate) params: &'e Value,
}

impl<'e> Evaluator<'e> {
    pub(crate) fn eval(&self, expr: &Expr, scope: &Scope) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column { table, name } => self.column(table.as_deref(), name, scope),
            Expr::Param(param) => self.param(param),
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, e) in fields {
                    map.insert(key.clone(), self.eval(e, scope)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Unary { op, expr } => {
                let v = self.eval(expr, scope)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                Ok(match op {
                    UnaryOp::Neg => as_number(&v).map(|n| number(-n)).unwrap_or(Value::Null),
                    UnaryOp::Not => Value::Bool(!truthy(&v)),
                })
            }
            Expr::Binary { left, op, right } => self.binary(left, *op, right, scope),
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let v = self.eval(expr, scope)?;
                let p = self.eval(pattern, scope)?;
                if v.is_null() || p.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(like(&to_text(&v), &to_text(&p)) != *negated))
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let v = self.eval(expr, scope)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                for item in list {
                    if sql_eq(&v, &self.eval(item, scope)?) == Some(true) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found != *negated))
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = self.eval(expr, scope)?;
                let lo = self.eval(low, scope)?;
                let hi = self.eval(high, scope)?;
                Ok(match (sql_cmp(&v, &lo), sql_cmp(&v, &hi)) {
                    (Some(a), Some(b)) => {
                        let inside = a != Ordering::Less && b != Ordering::Greater;
                        Value::Bool(inside != *negated)
                    }
                    _ => Value::Null,
                })
            }
            Expr::IsNull { expr, negated } => {
                let v = self.eval(expr, scope)?;
                Ok(Value::Bool(v.is_null() != *negated))
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                let subject = match operand {
                    Some(e) => Some(self.eval(e, scope)?),
                    None => None,
                };
                for (when, then) in branches {
                    let candidate = self.eval(when, scope)?;
                    let hit = match &subject {
                        Some(s) => sql_eq(s, &candidate) == Some(true),
                        None => truthy(&candidate),
                    };
                    if hit {
                        return self.eval(then, scope);
                    }
                }
                match otherwise {
                    Some(e) => self.eval(e, scope),
                    None => Ok(Value::Null),
                }
            }
            Expr::Function { name, args, star } => self.function(name, args, *star, scope),
        }
    }

    pub(crate) fn eval_args(&self, args: &[Expr], scope: &Scope) -> Result<Vec<Value>> {
        args.iter().map(|a| self.eval(a, scope)).collect()
    }

    fn column(&self, table: Option<&str>, name: &str, scope: &Scope) -> Result<Value> {
        if table.is_none()
            && let Some(value) = scope.output.and_then(|row| row.get(name))
        {
            return Ok(value.clone());
        }
        let Some(tuple) = scope.first() else {
            return Ok(Value::Null);
        };
        Ok(tuple.lookup(table, name)?.unwrap_or(Value::Null))
    }

    pub(crate) fn param(&self, param: &ParamRef) -> Result<Value> {
        match param {
            ParamRef::Positional(index) => match self.params {
                Value::Array(items) => items.get(*index).cloned(),
                _ => None,
            }
            .ok_or_else(|| EngineError::MissingParameter(format!("?{}", index + 1))),
            ParamRef::Named(name) => match self.params {
                Value::Object(map) => map.get(name).cloned(),
                _ => None,
            }
            .ok_or_else(|| EngineError::MissingParameter(format!("${}", name))),
        }
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr, scope: &Scope) -> Result<Value> {
        match op {
            BinaryOp::And => {
                let l = self.eval(left, scope)?;
                if !l.is_null() && !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval(right, scope)?;
                if !r.is_null() && !truthy(&r) {
                    return Ok(Value::Bool(false));
                }
                Ok(if l.is_null() || r.is_null() {
                    Value::Null
                } else {
                    Value::Bool(true)
                })
            }
            BinaryOp::Or => {
                let l = self.eval(left, scope)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval(right, scope)?;
                if truthy(&r) {
                    return Ok(Value::Bool(true));
                }
                Ok(if l.is_null() || r.is_null() {
                    Value::Null
                } else {
                    Value::Bool(false)
                })
            }
            _ => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                Ok(apply_binary(op, &l, &r))
            }
        }
    }

    fn function(&self, name: &str, args: &[Expr], star: bool, scope: &Scope) -> Result<Value> {
        if let Some(hook) = self.engine.hooks.function(name) {
            return match hook {
                FunctionHook::Scalar(f) => {
                    let values = self.eval_args(args, scope)?;
                    f(&values).map_err(EngineError::Hook)
                }
                FunctionHook::Aggregate(f) => {
                    let values = self.group_values(name, args.first(), scope)?;
                    f(&values).map_err(EngineError::Hook)
                }
            };
        }

        if is_aggregate_builtin(name) {
            if !scope.grouped {
                return Err(EngineError::MisplacedAggregate(name.to_string()));
            }
            let values = if star {
                Vec::new()
            } else {
                self.group_values(name, args.first(), scope)?
            };
            return call_aggregate(name, &values, scope.tuples.len(), star);
        }

        let values = self.eval_args(args, scope)?;
        call_scalar(name, &values)
    }

    /// Evaluate an aggregate's argument once per tuple of the group.
    fn group_values(&self, name: &str, arg: Option<&Expr>, scope: &Scope) -> Result<Vec<Value>> {
        if !scope.grouped {
            return Err(EngineError::MisplacedAggregate(name.to_string()));
        }
        let Some(arg) = arg else {
            return Err(EngineError::invalid_arg(name, "expected an argument"));
        };
        scope
            .tuples
            .iter()
            .map(|tuple| self.eval(arg, &Scope::row(tuple)))
            .collect()
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Bool(_))
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    if l.is_null() || r.is_null() {
        return Value::Null;
    }
    match op {
        BinaryOp::Add if !(is_numeric(l) && is_numeric(r)) => {
            Value::String(format!("{}{}", to_text(l), to_text(r)))
        }
        BinaryOp::Concat => Value::String(format!("{}{}", to_text(l), to_text(r))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (Some(a), Some(b)) = (as_number(l), as_number(r)) else {
                return Value::Null;
            };
            match op {
                BinaryOp::Add => number(a + b),
                BinaryOp::Sub => number(a - b),
                BinaryOp::Mul => number(a * b),
                BinaryOp::Div if b == 0.0 => Value::Null,
                BinaryOp::Div => number(a / b),
                BinaryOp::Mod if b == 0.0 => Value::Null,
                _ => number(a % b),
            }
        }
        BinaryOp::Eq => bool_or_null(sql_eq(l, r)),
        BinaryOp::NotEq => bool_or_null(sql_eq(l, r).map(|eq| !eq)),
        BinaryOp::Lt => bool_or_null(sql_cmp(l, r).map(|o| o == Ordering::Less)),
        BinaryOp::LtEq => bool_or_null(sql_cmp(l, r).map(|o| o != Ordering::Greater)),
        BinaryOp::Gt => bool_or_null(sql_cmp(l, r).map(|o| o == Ordering::Greater)),
        BinaryOp::GtEq => bool_or_null(sql_cmp(l, r).map(|o| o != Ordering::Less)),
        BinaryOp::And | BinaryOp::Or => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    #[test]
    fn test_apply_binary_arithmetic_and_concat() {
        assert_eq!(apply_binary(BinaryOp::Add, &json!(1), &json!(2)), json!(3));
        assert_eq!(apply_binary(BinaryOp::Add, &json!("a"), &json!(1)), json!("a1"));
        assert_eq!(apply_binary(BinaryOp::Div, &json!(1), &json!(0)), json!(null));
        assert_eq!(apply_binary(BinaryOp::Mul, &json!("3"), &json!(2)), json!(6));
        assert_eq!(apply_binary(BinaryOp::Concat, &json!(1), &json!(2)), json!("12"));
        assert_eq!(apply_binary(BinaryOp::Sub, &json!(null), &json!(2)), json!(null));
    }

    #[test]
    fn test_three_valued_logic() {
        let engine = SqlEngine::new();
        let eval = Evaluator {
            engine: &engine,
            params: &Value::Null,
        };
        let scope = Scope::empty();
        let and = |l, r| Expr::Binary {
            left: Box::new(lit(l)),
            op: BinaryOp::And,
            right: Box::new(lit(r)),
        };
        assert_eq!(eval.eval(&and(json!(null), json!(false)), &scope).unwrap(), json!(false));
        assert_eq!(eval.eval(&and(json!(null), json!(true)), &scope).unwrap(), json!(null));
        let or = Expr::Binary {
            left: Box::new(lit(json!(null))),
            op: BinaryOp::Or,
            right: Box::new(lit(json!(1))),
        };
        assert_eq!(eval.eval(&or, &scope).unwrap(), json!(true));
    }

    #[test]
    fn test_column_lookup_prefers_output_then_bindings() {
        let engine = SqlEngine::new();
        let eval = Evaluator {
            engine: &engine,
            params: &Value::Null,
        };
        let row = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        let tuple = Tuple::single("t".into(), row);
        let output = json!({"a": 10}).as_object().cloned().unwrap();
        let scope = Scope::row(&tuple).with_output(&output);
        let a = Expr::Column {
            table: None,
            name: "a".into(),
        };
        let ta = Expr::Column {
            table: Some("T".into()),
            name: "a".into(),
        };
        let missing = Expr::Column {
            table: Some("x".into()),
            name: "a".into(),
        };
        assert_eq!(eval.eval(&a, &scope).unwrap(), json!(10));
        assert_eq!(eval.eval(&ta, &scope).unwrap(), json!(1));
        assert!(matches!(
            eval.eval(&missing, &scope),
            Err(EngineError::UnknownAlias(_))
        ));
    }

    #[test]
    fn test_params_positional_and_named() {
        let engine = SqlEngine::new();
        let positional = json!([5, "x"]);
        let eval = Evaluator {
            engine: &engine,
            params: &positional,
        };
        assert_eq!(eval.param(&ParamRef::Positional(1)).unwrap(), json!("x"));
        assert!(matches!(
            eval.param(&ParamRef::Positional(2)),
            Err(EngineError::MissingParameter(_))
        ));
        assert!(eval.param(&ParamRef::Named("x".into())).is_err());

        let named = json!({"min": 3});
        let eval = Evaluator {
            engine: &engine,
            params: &named,
        };
        assert_eq!(eval.param(&ParamRef::Named("min".into())).unwrap(), json!(3));
    }

    #[test]
    fn test_aggregate_outside_group_is_rejected() {
        let engine = SqlEngine::new();
        let eval = Evaluator {
            engine: &engine,
            params: &Value::Null,
        };
        let sum = Expr::Function {
            name: "SUM".into(),
            args: vec![lit(json!(1))],
            star: false,
        };
        assert!(matches!(
            eval.eval(&sum, &Scope::empty()),
            Err(EngineError::MisplacedAggregate(_))
        ));
    }
}
