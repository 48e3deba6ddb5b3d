//! Statement execution and the hook registry front door.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, PoisonError};
use tracing::{debug, trace};

use super::ast::{
    Expr, FromClause, HookCall, Insert, InsertSource, JoinKind, OrderItem, ParamRef, Select, SelectItem,
    Source, Statement, TableRef,
};
use super::expr::{Evaluator, Scope, Tuple};
use super::hooks::{FunctionHook, HookTables};
use super::parser::parse;
use super::preprocess::substitute_unique_id;
use super::rows::{QueryOutput, Row, RowSet};
use super::value::{as_number, total_cmp, truthy};
use crate::builtins::is_aggregate_builtin;
use crate::error::{EngineError, HookError, Result};

/// Columns contributed by each FROM/JOIN source, in source order.
type Layout = Vec<(String, Vec<String>)>;

/// SQL evaluator plus its FROM/INTO/function hook tables.
///
/// Registration takes `&self`; the tables are internally locked so one engine
/// can be shared process-wide (see [`shared`]).
#[derive(Default)]
pub struct SqlEngine {
    pub(crate) hooks: HookTables,
}

/// The process-wide engine that providers and functions install into.
pub fn shared() -> Arc<SqlEngine> {
    static SHARED: OnceLock<Arc<SqlEngine>> = OnceLock::new();
    SHARED.get_or_init(|| Arc::new(SqlEngine::new())).clone()
}

impl SqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the source behind `FROM NAME(...)`.
    pub fn register_from<F>(&self, name: &str, hook: F)
    where
        F: Fn(&[Value]) -> std::result::Result<RowSet, HookError> + Send + Sync + 'static,
    {
        let name = name.to_ascii_uppercase();
        debug!(hook = %name, "registering FROM source");
        self.hooks
            .from
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(hook));
    }

    /// Register (or replace) the target behind `INTO NAME(...)`.
    pub fn register_into<F>(&self, name: &str, hook: F)
    where
        F: Fn(&[Value], &RowSet) -> std::result::Result<usize, HookError> + Send + Sync + 'static,
    {
        let name = name.to_ascii_uppercase();
        debug!(hook = %name, "registering INTO target");
        self.hooks
            .into
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(hook));
    }

    /// Register (or replace) a function. Registered functions shadow built-ins.
    pub fn register_function(&self, name: &str, hook: FunctionHook) {
        let name = name.to_ascii_uppercase();
        debug!(function = %name, aggregate = hook.is_aggregate(), "registering function");
        self.hooks
            .functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, hook);
    }

    pub fn register_scalar<F>(&self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, HookError> + Send + Sync + 'static,
    {
        self.register_function(name, FunctionHook::Scalar(Arc::new(f)));
    }

    pub fn register_aggregate<F>(&self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, HookError> + Send + Sync + 'static,
    {
        self.register_function(name, FunctionHook::Aggregate(Arc::new(f)));
    }

    pub fn has_from(&self, name: &str) -> bool {
        self.hooks.from_hook(name).is_some()
    }

    pub fn has_into(&self, name: &str) -> bool {
        self.hooks.into_hook(name).is_some()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.hooks.function(name).is_some()
    }

    /// Run `install` the first time `key` is seen; later calls are no-ops.
    ///
    /// The check and the install happen under one lock, so concurrent callers
    /// never install twice. `install` must not call `install_once` itself.
    /// Returns whether `install` ran.
    pub fn install_once(&self, key: &str, install: impl FnOnce(&SqlEngine)) -> bool {
        let mut installed = self
            .hooks
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if installed.contains(key) {
            return false;
        }
        install(self);
        installed.insert(key.to_string());
        debug!(key, "installed hooks");
        true
    }

    /// Evaluate `sql` with `params` bound to `?` / `$name`.
    ///
    /// Statements are separated by `;` and the last one's output is returned.
    /// `Ok(None)` means there was nothing to run.
    pub fn evaluate(&self, sql: &str, params: &Value) -> Result<Option<QueryOutput>> {
        let sql = substitute_unique_id(sql);
        let statements = parse(&sql)?;
        trace!(sql = %sql, statements = statements.len(), "evaluating");
        let mut last = None;
        for statement in &statements {
            last = Some(self.execute(statement, params)?);
        }
        Ok(last)
    }

    fn is_aggregate(&self, name: &str) -> bool {
        match self.hooks.function(name) {
            Some(hook) => hook.is_aggregate(),
            None => is_aggregate_builtin(name),
        }
    }

    fn execute(&self, statement: &Statement, params: &Value) -> Result<QueryOutput> {
        match statement {
            Statement::Select(select) => {
                let rows = self.run_select(select, params)?;
                match &select.into {
                    Some(target) => Ok(QueryOutput::Count(self.write_into(target, &rows, params)?)),
                    None => Ok(QueryOutput::Rows(rows)),
                }
            }
            Statement::Insert(insert) => {
                let rows = self.insert_rows(insert, params)?;
                Ok(QueryOutput::Count(
                    self.write_into(&insert.target, &rows, params)?,
                ))
            }
        }
    }

    fn insert_rows(&self, insert: &Insert, params: &Value) -> Result<RowSet> {
        let eval = Evaluator {
            engine: self,
            params,
        };
        match &insert.source {
            InsertSource::Values(tuples) => {
                let mut rows = Vec::with_capacity(tuples.len());
                for tuple in tuples {
                    if !insert.columns.is_empty() && tuple.len() != insert.columns.len() {
                        return Err(EngineError::invalid_arg(
                            "INSERT",
                            format!(
                                "{} columns named but {} values given",
                                insert.columns.len(),
                                tuple.len()
                            ),
                        ));
                    }
                    let values = eval.eval_args(tuple, &Scope::empty())?;
                    let row: Row = values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| {
                            let name = insert
                                .columns
                                .get(i)
                                .cloned()
                                .unwrap_or_else(|| i.to_string());
                            (name, v)
                        })
                        .collect();
                    rows.push(row);
                }
                if insert.columns.is_empty() {
                    Ok(RowSet::from_rows(rows))
                } else {
                    Ok(RowSet::new(insert.columns.clone(), rows))
                }
            }
            InsertSource::Select(select) => {
                let produced = self.run_select(select, params)?;
                if insert.columns.is_empty() {
                    return Ok(produced);
                }
                if produced.columns.len() != insert.columns.len() {
                    return Err(EngineError::invalid_arg(
                        "INSERT",
                        format!(
                            "{} columns named but SELECT produced {}",
                            insert.columns.len(),
                            produced.columns.len()
                        ),
                    ));
                }
                let rows = produced
                    .rows
                    .iter()
                    .map(|row| {
                        produced
                            .columns
                            .iter()
                            .zip(&insert.columns)
                            .map(|(from, to)| {
                                (to.clone(), row.get(from).cloned().unwrap_or(Value::Null))
                            })
                            .collect()
                    })
                    .collect();
                Ok(RowSet::new(insert.columns.clone(), rows))
            }
        }
    }

    fn write_into(&self, target: &HookCall, rows: &RowSet, params: &Value) -> Result<usize> {
        let hook = self
            .hooks
            .into_hook(&target.name)
            .ok_or_else(|| EngineError::UnknownInto(target.name.clone()))?;
        let eval = Evaluator {
            engine: self,
            params,
        };
        let args = eval.eval_args(&target.args, &Scope::empty())?;
        debug!(target = %target.name, rows = rows.len(), "writing rows");
        hook(&args, rows).map_err(EngineError::Hook)
    }

    fn run_select(&self, select: &Select, params: &Value) -> Result<RowSet> {
        let eval = Evaluator {
            engine: self,
            params,
        };
        let (layout, mut tuples) = self.load_from(select.from.as_ref(), &eval)?;

        if let Some(filter) = &select.selection {
            let mut kept = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                if truthy(&eval.eval(filter, &Scope::row(&tuple))?) {
                    kept.push(tuple);
                }
            }
            tuples = kept;
        }

        let is_aggregate = |name: &str| self.is_aggregate(name);
        let grouped = !select.group_by.is_empty()
            || select
                .items
                .iter()
                .filter_map(SelectItem::expr)
                .any(|e| e.contains_aggregate(&is_aggregate))
            || select
                .having
                .as_ref()
                .is_some_and(|h| h.contains_aggregate(&is_aggregate));

        let units: Vec<Vec<Tuple>> = if grouped {
            self.group(&select.group_by, tuples, &eval)?
        } else {
            tuples.into_iter().map(|t| vec![t]).collect()
        };

        let columns = output_columns(&select.items, &layout)?;
        let mut produced: Vec<(Row, Vec<Value>)> = Vec::with_capacity(units.len());
        for unit in &units {
            let scope = Scope::unit(unit, grouped);
            let row = project(&select.items, &layout, &scope, &eval)?;
            let scope = scope.with_output(&row);
            if let Some(having) = &select.having
                && !truthy(&eval.eval(having, &scope)?)
            {
                continue;
            }
            let keys = order_keys(&select.order_by, &scope, &eval)?;
            produced.push((row, keys));
        }

        if !select.order_by.is_empty() {
            produced.sort_by(|(_, a), (_, b)| compare_keys(a, b, &select.order_by));
        }

        let mut rows: Vec<Row> = produced.into_iter().map(|(row, _)| row).collect();
        if select.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(Value::Object(row.clone()).to_string()));
        }

        let offset = count_clause("OFFSET", select.offset.as_ref(), &eval)?.unwrap_or(0);
        let limit = match (
            count_clause("LIMIT", select.limit.as_ref(), &eval)?,
            count_clause("TOP", select.top.as_ref(), &eval)?,
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        Ok(RowSet::new(columns, rows))
    }

    fn load_from(&self, from: Option<&FromClause>, eval: &Evaluator) -> Result<(Layout, Vec<Tuple>)> {
        let Some(from) = from else {
            // No FROM: a single empty tuple so `SELECT 1` yields one row.
            return Ok((Vec::new(), vec![Tuple::default()]));
        };

        let (alias, set) = self.load_table(&from.table, eval)?;
        let mut tuples: Vec<Tuple> = set
            .rows
            .into_iter()
            .map(|row| Tuple::single(alias.clone(), row))
            .collect();
        let mut layout = vec![(alias, set.columns)];

        for join in &from.joins {
            let (alias, set) = self.load_table(&join.table, eval)?;
            let mut joined = Vec::new();
            for left in &tuples {
                let mut matched = false;
                for right in &set.rows {
                    let candidate = left.with(alias.clone(), right.clone());
                    if truthy(&eval.eval(&join.on, &Scope::row(&candidate))?) {
                        matched = true;
                        joined.push(candidate);
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    let nulls: Row = set
                        .columns
                        .iter()
                        .map(|c| (c.clone(), Value::Null))
                        .collect();
                    joined.push(left.with(alias.clone(), nulls));
                }
            }
            layout.push((alias, set.columns));
            tuples = joined;
        }

        Ok((layout, tuples))
    }

    fn load_table(&self, table: &TableRef, eval: &Evaluator) -> Result<(String, RowSet)> {
        let (default_alias, set) = match &table.source {
            Source::Hook(call) => {
                let hook = self
                    .hooks
                    .from_hook(&call.name)
                    .ok_or_else(|| EngineError::UnknownFrom(call.name.clone()))?;
                let args = eval.eval_args(&call.args, &Scope::empty())?;
                debug!(source = %call.name, "reading rows");
                let set = hook(&args).map_err(EngineError::Hook)?;
                (call.name.clone(), set)
            }
            Source::Param(param) => {
                let label = match param {
                    ParamRef::Positional(_) => "?".to_string(),
                    ParamRef::Named(name) => name.clone(),
                };
                let value = eval.param(param)?;
                (label.clone(), rows_from_value(&label, value)?)
            }
            Source::Subquery(select) => ("subquery".to_string(), self.run_select(select, eval.params)?),
        };
        Ok((table.alias.clone().unwrap_or(default_alias), set))
    }

    fn group(&self, keys: &[Expr], tuples: Vec<Tuple>, eval: &Evaluator) -> Result<Vec<Vec<Tuple>>> {
        if keys.is_empty() {
            // Aggregates without GROUP BY: one group, even when empty.
            return Ok(vec![tuples]);
        }
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<Tuple>> = Vec::new();
        for tuple in tuples {
            let key = keys
                .iter()
                .map(|k| eval.eval(k, &Scope::row(&tuple)))
                .collect::<Result<Vec<_>>>()?;
            let key = Value::Array(key).to_string();
            match index.get(&key) {
                Some(&i) => groups[i].push(tuple),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![tuple]);
                }
            }
        }
        Ok(groups)
    }
}

fn rows_from_value(label: &str, value: Value) -> Result<RowSet> {
    let Value::Array(items) = value else {
        return Err(EngineError::NotRowArray(label.to_string()));
    };
    let rows = items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            _ => Err(EngineError::NotRowArray(label.to_string())),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RowSet::from_rows(rows))
}

/// Column name for an unaliased expression: the bare column name for a
/// column reference, otherwise the expression's source text.
fn item_name(item: &SelectItem) -> Option<String> {
    match item {
        SelectItem::Expr {
            alias: Some(alias), ..
        } => Some(alias.clone()),
        SelectItem::Expr {
            expr: Expr::Column { name, .. },
            ..
        } => Some(name.clone()),
        SelectItem::Expr { label, .. } => Some(label.clone()),
        _ => None,
    }
}

fn layout_entry<'l>(layout: &'l Layout, alias: &str) -> Result<&'l (String, Vec<String>)> {
    layout
        .iter()
        .find(|(a, _)| a.eq_ignore_ascii_case(alias))
        .ok_or_else(|| EngineError::UnknownAlias(alias.to_string()))
}

fn output_columns(items: &[SelectItem], layout: &Layout) -> Result<Vec<String>> {
    let mut columns: Vec<String> = Vec::new();
    let mut push = |name: &String| {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    };
    for item in items {
        match item {
            SelectItem::Wildcard => layout.iter().flat_map(|(_, cols)| cols).for_each(&mut push),
            SelectItem::QualifiedWildcard(alias) => {
                layout_entry(layout, alias)?.1.iter().for_each(&mut push)
            }
            SelectItem::Expr { .. } => {
                if let Some(name) = item_name(item) {
                    push(&name);
                }
            }
        }
    }
    Ok(columns)
}

fn copy_binding(out: &mut Row, tuple: Option<&Tuple>, alias: &str, columns: &[String]) {
    let source = tuple.and_then(|t| t.binding(alias));
    for column in columns {
        if out.contains_key(column) {
            continue;
        }
        let value = source
            .and_then(|row| row.get(column))
            .cloned()
            .unwrap_or(Value::Null);
        out.insert(column.clone(), value);
    }
}

fn project(items: &[SelectItem], layout: &Layout, scope: &Scope, eval: &Evaluator) -> Result<Row> {
    let mut row = Row::new();
    for item in items {
        match item {
            SelectItem::Wildcard => {
                for (alias, columns) in layout {
                    copy_binding(&mut row, scope.first(), alias, columns);
                }
            }
            SelectItem::QualifiedWildcard(alias) => {
                let (alias, columns) = layout_entry(layout, alias)?;
                copy_binding(&mut row, scope.first(), alias, columns);
            }
            SelectItem::Expr { expr, .. } => {
                let value = eval.eval(expr, scope)?;
                if let Some(name) = item_name(item) {
                    row.insert(name, value);
                }
            }
        }
    }
    Ok(row)
}

fn order_keys(order_by: &[OrderItem], scope: &Scope, eval: &Evaluator) -> Result<Vec<Value>> {
    order_by.iter().map(|o| eval.eval(&o.expr, scope)).collect()
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[OrderItem]) -> Ordering {
    for ((x, y), item) in a.iter().zip(b).zip(order_by) {
        let ord = total_cmp(x, y);
        let ord = if item.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn count_clause(clause: &str, expr: Option<&Expr>, eval: &Evaluator) -> Result<Option<usize>> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    let value = eval.eval(expr, &Scope::empty())?;
    match as_number(&value) {
        Some(n) if n >= 0.0 && n.is_finite() => Ok(Some(n as usize)),
        _ => Err(EngineError::invalid_arg(
            clause,
            format!("expected a non-negative number, got {}", value),
        )),
    }
}
