//! Cached query execution against one provider instance.

use serde_json::Value;
use sheetql_engine::{QueryOutput, RowSet};
use std::sync::Arc;
use tracing::debug;

use super::cache_key::{CacheKeySelector, query_cache_key};
use super::context::execute;
use super::registration::{QueryableProvider, install_provider};
use crate::cache::Cache;
use crate::error::Result;
use crate::services::Services;

/// A provider instance bound to the services it queries through.
///
/// Construction installs the provider type's tables and the registry's
/// functions into the engine (once per type and name). Results are cached
/// under the provider type's namespace.
pub struct Queryable<P: QueryableProvider> {
    provider: Arc<P>,
    services: Services,
    cache: Cache,
}

impl<P: QueryableProvider> Clone for Queryable<P> {
    fn clone(&self) -> Self {
        Queryable {
            provider: Arc::clone(&self.provider),
            services: self.services.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<P: QueryableProvider> Queryable<P> {
    pub fn new(provider: P, services: &Services) -> Result<Self> {
        install_provider::<P>(services.engine());
        let cache = Cache::for_owner(services.cache_provider(), P::PROVIDER_TYPE)?;
        Ok(Queryable {
            provider: Arc::new(provider),
            services: services.clone(),
            cache,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Evaluate `sql` with this provider active, bypassing the cache.
    pub fn run_query(&self, sql: &str, parameters: &Value) -> Result<Option<QueryOutput>> {
        let provider = Arc::clone(&self.provider);
        let functions = Arc::clone(self.services.functions());
        let engine = self.services.engine();
        let output = execute(provider, functions, || engine.evaluate(sql, parameters))?;
        Ok(output)
    }

    /// Rows of the result; statements without rows yield an empty set.
    pub fn query(
        &self,
        sql: &str,
        cache_key: impl Into<CacheKeySelector>,
        parameters: &Value,
    ) -> Result<RowSet> {
        Ok(self
            .query_any(sql, cache_key, parameters)?
            .and_then(QueryOutput::into_rows)
            .unwrap_or_default())
    }

    /// Whatever the last statement produced; `None` for empty input.
    pub fn query_any(
        &self,
        sql: &str,
        cache_key: impl Into<CacheKeySelector>,
        parameters: &Value,
    ) -> Result<Option<QueryOutput>> {
        let selector = cache_key.into();
        self.query_internal(sql, &selector, parameters, || {
            self.run_query(sql, parameters)
        })
    }

    /// Consult the cache around `eval`.
    ///
    /// A disabled selector always evaluates. Otherwise a hit is returned as
    /// stored, and on a miss any defined output (including zero rows) is
    /// stored before it is returned.
    pub fn query_internal<F>(
        &self,
        sql: &str,
        selector: &CacheKeySelector,
        parameters: &Value,
        eval: F,
    ) -> Result<Option<QueryOutput>>
    where
        F: FnOnce() -> Result<Option<QueryOutput>>,
    {
        if !selector.is_enabled() {
            return eval();
        }
        let key = query_cache_key(sql, selector, parameters);
        if let Some(hit) = self.cache.get::<QueryOutput>(&key)? {
            debug!(provider = P::PROVIDER_TYPE, key = %key, "query cache hit");
            return Ok(Some(hit));
        }
        debug!(provider = P::PROVIDER_TYPE, key = %key, "query cache miss");
        let output = eval()?;
        if let Some(output) = &output {
            self.cache
                .set(&key, output, self.services.config().query_ttl())?;
        }
        Ok(output)
    }

    /// Drop every cached result for this provider type.
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheProvider;
    use crate::error::SheetqlError;
    use crate::providers::MemoryProvider;
    use crate::query::{ExecutionContext, TableMethods};
    use serde_json::json;
    use sheetql_engine::{Row, SqlEngine};
    use std::cell::Cell;

    fn services() -> Services {
        Services::builder()
            .engine(Arc::new(SqlEngine::new()))
            .cache_provider(Arc::new(MemoryCacheProvider::new()))
            .build()
            .unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn rows(n: i64) -> Option<QueryOutput> {
        let rows = (0..n).map(|i| row(json!({"i": i}))).collect();
        Some(QueryOutput::Rows(RowSet::from_rows(rows)))
    }

    #[test]
    fn test_cache_hit_skips_evaluation() {
        let q = Queryable::new(MemoryProvider::new(), &services()).unwrap();
        let calls = Cell::new(0);
        let params = json!({"a": 1});
        let selector = CacheKeySelector::from("k");
        let mut results = Vec::new();
        for _ in 0..2 {
            let out = q
                .query_internal("SELECT 1", &selector, &params, || {
                    calls.set(calls.get() + 1);
                    Ok(rows(2))
                })
                .unwrap();
            results.push(out);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn test_no_caching_without_a_key() {
        let q = Queryable::new(MemoryProvider::new(), &services()).unwrap();
        let calls = Cell::new(0);
        let mut results = Vec::new();
        for _ in 0..2 {
            let out = q
                .query_internal("SELECT 1", &CacheKeySelector::None, &Value::Null, || {
                    calls.set(calls.get() + 1);
                    Ok(rows(calls.get()))
                })
                .unwrap();
            results.push(out);
        }
        assert_ne!(results[0], results[1]);
    }

    #[test]
    fn test_absent_result_is_not_cached_but_zero_rows_are() {
        let q = Queryable::new(MemoryProvider::new(), &services()).unwrap();
        let selector = CacheKeySelector::Content;
        let calls = Cell::new(0);
        for _ in 0..2 {
            q.query_internal("", &selector, &Value::Null, || {
                calls.set(calls.get() + 1);
                Ok(None)
            })
            .unwrap();
        }
        assert_eq!(calls.get(), 2);

        for _ in 0..2 {
            q.query_internal("SELECT 0", &selector, &Value::Null, || {
                calls.set(calls.get() + 1);
                Ok(rows(0))
            })
            .unwrap();
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_cached_query_serves_stale_rows_until_cleared() {
        let provider = MemoryProvider::new();
        provider.insert("t", RowSet::from_rows(vec![row(json!({"n": 1}))]));
        let q = Queryable::new(provider, &services()).unwrap();
        let sql = "SELECT n FROM MEMORY('t')";

        assert_eq!(q.query(sql, true, &Value::Null).unwrap().len(), 1);
        q.provider()
            .insert("t", RowSet::from_rows(vec![row(json!({"n": 1})), row(json!({"n": 2}))]));
        assert_eq!(q.query(sql, true, &Value::Null).unwrap().len(), 1);
        assert_eq!(q.query(sql, false, &Value::Null).unwrap().len(), 2);

        q.clear_cache().unwrap();
        assert_eq!(q.query(sql, true, &Value::Null).unwrap().len(), 2);
    }

    #[test]
    fn test_hook_errors_come_back_typed() {
        let services = services();
        let q = Queryable::new(MemoryProvider::new(), &services).unwrap();
        let err = q
            .query_any("SELECT EXCHANGE(1, 'USD', 'XXX')", false, &Value::Null)
            .unwrap_err();
        assert!(matches!(err, SheetqlError::UnknownCurrency(_)));
    }

    /// Reads its rows by running a query on an inner provider.
    struct Outer {
        inner: Queryable<MemoryProvider>,
    }

    impl Outer {
        fn read(&self, _args: &[Value]) -> Result<RowSet> {
            let ctx = ExecutionContext::current()?;
            ctx.set("seen", json!("outer"));
            let parent_id = ctx.id();
            let mut rows = self.inner.query("SELECT v FROM MEMORY('t')", false, &Value::Null)?;
            let after = ExecutionContext::current()?;
            assert_eq!(after.id(), parent_id);
            assert_eq!(after.get("seen"), Some(json!("outer")));
            for row in &mut rows.rows {
                row.insert("wrapped".into(), json!(true));
            }
            rows.columns.push("wrapped".into());
            Ok(rows)
        }
    }

    impl QueryableProvider for Outer {
        const PROVIDER_TYPE: &'static str = "Outer";

        fn table_methods() -> TableMethods<Self> {
            TableMethods::new().with_from("WRAP", Outer::read)
        }
    }

    #[test]
    fn test_nested_queries_inside_hooks() {
        let services = services();
        let inner = MemoryProvider::new();
        inner.insert("t", RowSet::from_rows(vec![row(json!({"v": 7}))]));
        let inner = Queryable::new(inner, &services).unwrap();
        let outer = Queryable::new(Outer { inner }, &services).unwrap();

        let out = outer
            .query("SELECT v, wrapped FROM WRAP()", false, &Value::Null)
            .unwrap();
        assert_eq!(out.rows, vec![row(json!({"v": 7, "wrapped": true}))]);
        assert!(!ExecutionContext::is_active());
    }

    #[test]
    fn test_script_functions_through_sql() {
        let script = r#"
            fn margin(price, cost) { (price - cost) / price }
            fn pad(s) { pad(s, "*") }
            fn pad(s, fill) { fill + s + fill }
        "#;
        let mut builder = Services::builder()
            .engine(Arc::new(SqlEngine::new()))
            .cache_provider(Arc::new(MemoryCacheProvider::new()));
        for function in crate::functions::compile_script_functions(script).unwrap() {
            builder = builder.function(Arc::new(function));
        }
        let q = Queryable::new(MemoryProvider::new(), &builder.build().unwrap()).unwrap();

        let sql = "SELECT MARGIN(10, 4) AS m, PAD('x') AS a, PAD('x', '-') AS b";
        let out = q.query(sql, false, &Value::Null).unwrap();
        assert_eq!(out.rows, vec![row(json!({"m": 0.6, "a": "*x*", "b": "-x-"}))]);
    }
}
