//! The typed cache front.
//!
//! Values are stored as JSON text. When the backend cannot list keys by
//! prefix, every key set through this cache is recorded in an index entry
//! (`ALL_KEYS`) so `clear` can find them. Two `Cache` values sharing a
//! namespace update that index without coordination and can drift apart.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, trace};

use super::CacheProvider;
use crate::error::{Result, SheetqlError};

/// Index key listing every key set under a namespace.
pub const ALL_KEYS: &str = "__all_keys__";

#[derive(Clone)]
pub struct Cache {
    provider: Arc<dyn CacheProvider>,
    prefix: Arc<OnceLock<String>>,
}

impl Cache {
    /// An uninitialized cache; call [`Cache::initialize`] before use.
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Cache {
            provider,
            prefix: Arc::new(OnceLock::new()),
        }
    }

    /// Create and initialize in one step.
    pub fn for_owner(provider: Arc<dyn CacheProvider>, owner: &str) -> Result<Self> {
        let cache = Cache::new(provider);
        cache.initialize(owner)?;
        Ok(cache)
    }

    /// Bind the namespace. Fails if one is already bound.
    pub fn initialize(&self, owner: &str) -> Result<()> {
        self.prefix.set(owner.to_string()).map_err(|_| {
            SheetqlError::AlreadyInitialized(self.prefix.get().cloned().unwrap_or_default())
        })?;
        debug!(namespace = owner, "cache initialized");
        Ok(())
    }

    pub fn prefix(&self) -> Result<&str> {
        self.prefix
            .get()
            .map(String::as_str)
            .ok_or(SheetqlError::NotInitialized)
    }

    fn indexed(&self) -> bool {
        !self.provider.supports_prefix_scan()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let namespace = self.prefix()?;
        match self.provider.get(namespace, key)? {
            Some(raw) => {
                trace!(namespace, key, "cache hit");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => {
                trace!(namespace, key, "cache miss");
                Ok(None)
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(fallback))
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let namespace = self.prefix()?;
        let raw = serde_json::to_string(value)?;
        self.provider.set(namespace, key, &raw, ttl)?;
        if self.indexed() && key != ALL_KEYS {
            let mut keys = self.keys()?;
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
                self.write_keys(&keys)?;
            }
        }
        Ok(())
    }

    /// `get` then `del`; the delete happens even when the key was absent.
    pub fn pop<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value = self.get(key);
        self.del(key)?;
        value
    }

    pub fn pop_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> Result<T> {
        Ok(self.pop(key)?.unwrap_or(fallback))
    }

    pub fn del(&self, key: &str) -> Result<()> {
        let namespace = self.prefix()?;
        self.provider.del(namespace, key)?;
        if self.indexed() && key != ALL_KEYS {
            let mut keys = self.keys()?;
            let before = keys.len();
            keys.retain(|k| k != key);
            if keys.len() != before {
                self.write_keys(&keys)?;
            }
        }
        Ok(())
    }

    /// Remove every key set under this namespace, then the index itself.
    pub fn clear(&self) -> Result<()> {
        let namespace = self.prefix()?;
        if !self.indexed() {
            return self.provider.clear(namespace);
        }
        let keys = self.keys()?;
        for key in &keys {
            self.provider.del(namespace, key)?;
        }
        self.provider.del(namespace, ALL_KEYS)?;
        debug!(namespace, removed = keys.len(), "cache cleared");
        Ok(())
    }

    /// Keys recorded in the index. Empty when the backend scans by prefix.
    pub fn keys(&self) -> Result<Vec<String>> {
        if !self.indexed() {
            return Ok(Vec::new());
        }
        self.get_or(ALL_KEYS, Vec::new())
    }

    fn write_keys(&self, keys: &[String]) -> Result<()> {
        let raw = serde_json::to_string(keys)?;
        self.provider.set(self.prefix()?, ALL_KEYS, &raw, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCacheProvider, MemoryCacheProvider};
    use serde_json::{Value, json};

    fn memory_cache() -> (MemoryCacheProvider, Cache) {
        let provider = MemoryCacheProvider::new();
        let cache = Cache::for_owner(Arc::new(provider.clone()), "Owner").unwrap();
        (provider, cache)
    }

    #[test]
    fn test_uninitialized_cache_rejects_everything() {
        let cache = Cache::new(Arc::new(MemoryCacheProvider::new()));
        assert!(matches!(cache.get::<Value>("k"), Err(SheetqlError::NotInitialized)));
        assert!(matches!(cache.set("k", &1, None), Err(SheetqlError::NotInitialized)));
        assert!(matches!(cache.del("k"), Err(SheetqlError::NotInitialized)));
        assert!(matches!(cache.clear(), Err(SheetqlError::NotInitialized)));
    }

    #[test]
    fn test_double_initialize_fails() {
        let (_, cache) = memory_cache();
        assert!(matches!(
            cache.initialize("Other"),
            Err(SheetqlError::AlreadyInitialized(prefix)) if prefix == "Owner"
        ));
        assert_eq!(cache.prefix().unwrap(), "Owner");
    }

    #[test]
    fn test_get_or_fallback_and_pop() {
        let (_, cache) = memory_cache();
        assert_eq!(cache.get_or("missing", 7).unwrap(), 7);
        cache.set("k", &json!({"a": [1, 2]}), None).unwrap();
        assert_eq!(cache.pop::<Value>("k").unwrap(), Some(json!({"a": [1, 2]})));
        assert_eq!(cache.get_or("k", json!("gone")).unwrap(), json!("gone"));
        assert_eq!(cache.pop::<Value>("never").unwrap(), None);
    }

    #[test]
    fn test_index_tracks_set_and_del() {
        let (_, cache) = memory_cache();
        cache.set("a", &1, None).unwrap();
        cache.set("b", &2, None).unwrap();
        cache.set("a", &3, None).unwrap();
        assert_eq!(cache.keys().unwrap(), vec!["a", "b"]);
        cache.del("a").unwrap();
        assert_eq!(cache.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_clear_removes_every_physical_key() {
        let (provider, cache) = memory_cache();
        let neighbour = Cache::for_owner(Arc::new(provider.clone()), "Neighbour").unwrap();
        neighbour.set("keep", &true, None).unwrap();
        for key in ["x", "y", "z"] {
            cache.set(key, &key, None).unwrap();
        }
        cache.clear().unwrap();
        for key in ["x", "y", "z"] {
            assert_eq!(cache.get::<String>(key).unwrap(), None);
        }
        let remaining = provider.physical_keys();
        assert!(remaining.iter().all(|k| !k.starts_with("Owner:")), "{:?}", remaining);
        assert_eq!(neighbour.get::<bool>("keep").unwrap(), Some(true));
    }

    #[test]
    fn test_prefix_scan_backend_skips_index() {
        let provider = MemoryCacheProvider::with_prefix_scan();
        let cache = Cache::for_owner(Arc::new(provider.clone()), "Owner").unwrap();
        cache.set("a", &1, None).unwrap();
        assert_eq!(provider.physical_keys(), vec!["Owner:a"]);
        cache.clear().unwrap();
        assert!(provider.physical_keys().is_empty());
    }

    #[test]
    fn test_malformed_json_propagates() {
        let (provider, cache) = memory_cache();
        provider.set("Owner", "bad", "{not json", None).unwrap();
        assert!(matches!(cache.get::<Value>("bad"), Err(SheetqlError::Json(_))));
    }

    #[test]
    fn test_ttl_expires_entries() {
        let (_, cache) = memory_cache();
        cache.set("k", &1, Some(Duration::ZERO)).unwrap();
        assert_eq!(cache.get::<i32>("k").unwrap(), None);
    }

    #[test]
    fn test_file_backend_round_trip_and_clear() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        let cache = Cache::for_owner(Arc::new(provider.clone()), "Owner").unwrap();
        cache.set("rows", &json!([{"a": 1}]), None).unwrap();
        assert_eq!(cache.get::<Value>("rows").unwrap(), Some(json!([{"a": 1}])));
        cache.clear().unwrap();
        assert!(provider.physical_keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_handles_long_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        let cache = Cache::for_owner(Arc::new(provider.clone()), "Owner").unwrap();
        let key = "k".repeat(200);
        cache.set(&key, &1, None).unwrap();
        assert_eq!(cache.get::<i64>(&key).unwrap(), Some(1));
        cache.clear().unwrap();
        assert_eq!(cache.get::<i64>(&key).unwrap(), None);
        assert!(provider.physical_keys().unwrap().is_empty());
    }
}
