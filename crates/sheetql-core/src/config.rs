//! TOML configuration.
//!
//! ```toml
//! functions = ["~/sheets/finance.rhai"]
//!
//! [cache]
//! backend = "file"        # or "memory"
//! dir = "/tmp/sheetql"    # file backend only
//! query_ttl_secs = 21600  # 0 keeps results until cleared
//! rate_ttl_secs = 3600
//!
//! [rates]
//! base = "USD"
//!
//! [rates.table]
//! EUR = 0.92
//! GBP = 0.79
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheProvider, FileCacheProvider, MemoryCacheProvider};
use crate::error::{Result, SheetqlError};

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cache: CacheConfig,
    pub rates: RatesConfig,
    /// Rhai files whose functions become SQL functions.
    pub functions: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub dir: Option<PathBuf>,
    pub query_ttl_secs: u64,
    pub rate_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            backend: CacheBackend::File,
            dir: None,
            query_ttl_secs: 21_600,
            rate_ttl_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatesConfig {
    pub base: String,
    /// Units of each currency per one unit of `base`.
    pub table: BTreeMap<String, f64>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            base: "USD".to_string(),
            table: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SheetqlError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_FILE_BYTES {
            return Err(SheetqlError::Config(format!(
                "Refusing to read {}: file too large ({} bytes)",
                path.display(),
                meta.len()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| SheetqlError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `path` if given, else the user config file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Config::default()),
        }
    }

    /// `None` keeps cached query results until cleared.
    pub fn query_ttl(&self) -> Option<Duration> {
        match self.cache.query_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn rate_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.rate_ttl_secs)
    }

    /// Build the configured cache backend.
    pub fn cache_provider(&self) -> Arc<dyn CacheProvider> {
        match self.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCacheProvider::new()),
            CacheBackend::File => {
                let dir = self
                    .cache
                    .dir
                    .clone()
                    .or_else(FileCacheProvider::default_dir)
                    .unwrap_or_else(|| std::env::temp_dir().join("sheetql-cache"));
                Arc::new(FileCacheProvider::new(dir))
            }
        }
    }
}

/// `config.toml` in the per-user config directory.
pub fn default_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "sheetql")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}
