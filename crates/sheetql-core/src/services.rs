//! Service container: the shared engine, cache backend, function registry
//! and configuration every provider is built against.

use sheetql_engine::SqlEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::cache::CacheProvider;
use crate::config::Config;
use crate::error::Result;
use crate::functions::{
    CachedRates, FunctionRegistry, RateSource, SheetFunction, StaticRates, load_script_functions,
};
use crate::query::install_functions;

#[derive(Clone)]
pub struct Services {
    engine: Arc<SqlEngine>,
    cache_provider: Arc<dyn CacheProvider>,
    functions: Arc<FunctionRegistry>,
    config: Arc<Config>,
}

impl Services {
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::default()
    }

    pub fn engine(&self) -> &Arc<SqlEngine> {
        &self.engine
    }

    pub fn cache_provider(&self) -> Arc<dyn CacheProvider> {
        Arc::clone(&self.cache_provider)
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[derive(Default)]
pub struct ServicesBuilder {
    config: Option<Config>,
    engine: Option<Arc<SqlEngine>>,
    cache_provider: Option<Arc<dyn CacheProvider>>,
    rates: Option<Arc<dyn RateSource>>,
    functions: Vec<Arc<dyn SheetFunction>>,
    scripts: Vec<PathBuf>,
}

impl ServicesBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a private engine instead of the process-wide one.
    pub fn engine(mut self, engine: Arc<SqlEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn cache_provider(mut self, provider: Arc<dyn CacheProvider>) -> Self {
        self.cache_provider = Some(provider);
        self
    }

    /// Replace the configured rate table behind `EXCHANGE`.
    pub fn rates(mut self, rates: Arc<dyn RateSource>) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn function(mut self, function: Arc<dyn SheetFunction>) -> Self {
        self.functions.push(function);
        self
    }

    /// Load the functions defined in a Rhai script file.
    pub fn script(mut self, path: impl Into<PathBuf>) -> Self {
        self.scripts.push(path.into());
        self
    }

    /// Resolve defaults, load scripts and install every function hook.
    pub fn build(self) -> Result<Services> {
        let config = self.config.unwrap_or_default();
        let engine = self.engine.unwrap_or_else(sheetql_engine::shared);
        let cache_provider = self
            .cache_provider
            .unwrap_or_else(|| config.cache_provider());
        let rates = match self.rates {
            Some(rates) => rates,
            None => Arc::new(CachedRates::new(
                StaticRates::from_config(&config.rates),
                Arc::clone(&cache_provider),
                config.rate_ttl(),
            )?),
        };

        let mut registry = FunctionRegistry::with_defaults(rates);
        for path in config.functions.iter().chain(self.scripts.iter()) {
            for function in load_script_functions(path)? {
                registry.register(Arc::new(function));
            }
        }
        for function in self.functions {
            registry.register(function);
        }
        let installed = install_functions(&engine, &registry);
        debug!(functions = registry.len(), installed, "services built");

        Ok(Services {
            engine,
            cache_provider,
            functions: Arc::new(registry),
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheProvider;
    use std::io::Write;

    fn memory() -> Arc<dyn CacheProvider> {
        Arc::new(MemoryCacheProvider::new())
    }

    #[test]
    fn test_build_installs_default_functions() {
        let engine = Arc::new(SqlEngine::new());
        let services = Services::builder()
            .engine(Arc::clone(&engine))
            .cache_provider(memory())
            .build()
            .unwrap();
        for name in ["EXCHANGE", "MEDIAN", "RUNNING_SUM", "ROW_NUMBER"] {
            assert!(engine.has_function(name), "{name} not installed");
            assert!(services.functions().get(name).is_some());
        }
    }

    #[test]
    fn test_scripts_are_loaded_from_builder_paths() {
        let mut file = tempfile::Builder::new().suffix(".rhai").tempfile().unwrap();
        writeln!(file, "fn triple(x) {{ x * 3 }}").unwrap();
        let engine = Arc::new(SqlEngine::new());
        let services = Services::builder()
            .engine(Arc::clone(&engine))
            .cache_provider(memory())
            .script(file.path())
            .build()
            .unwrap();
        assert!(services.functions().get("triple").is_some());
        assert!(engine.has_function("TRIPLE"));
    }

    #[test]
    fn test_missing_script_fails_the_build() {
        let result = Services::builder()
            .engine(Arc::new(SqlEngine::new()))
            .cache_provider(memory())
            .script("/definitely/not/here.rhai")
            .build();
        assert!(result.is_err());
    }
}
