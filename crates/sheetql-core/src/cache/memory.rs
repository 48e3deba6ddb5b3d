//! In-process cache backend.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::entry::CacheEntry;
use super::{CacheProvider, namespace_prefix, physical_key};
use crate::error::Result;

/// DashMap-backed cache provider. Clones share the same map.
///
/// By default it behaves like a host key-value service with no way to list
/// keys, so [`Cache`](super::Cache) keeps its all-keys index.
#[derive(Clone, Default)]
pub struct MemoryCacheProvider {
    entries: Arc<DashMap<String, CacheEntry>>,
    prefix_scan: bool,
}

impl MemoryCacheProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that advertises prefix scans, so `Cache` skips its index.
    pub fn with_prefix_scan() -> Self {
        MemoryCacheProvider {
            entries: Arc::default(),
            prefix_scan: true,
        }
    }

    /// Every physical key currently stored, sorted.
    pub fn physical_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl CacheProvider for MemoryCacheProvider {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let physical = physical_key(namespace, key);
        let found = self
            .entries
            .get(&physical)
            .map(|entry| (entry.is_expired(), entry.value.clone()));
        match found {
            Some((true, _)) => {
                self.entries.remove(&physical);
                Ok(None)
            }
            Some((false, value)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    fn set(&self, namespace: &str, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.entries
            .insert(physical_key(namespace, key), CacheEntry::new(value, ttl));
        Ok(())
    }

    fn del(&self, namespace: &str, key: &str) -> Result<()> {
        self.entries.remove(&physical_key(namespace, key));
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        let prefix = namespace_prefix(namespace);
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn supports_prefix_scan(&self) -> bool {
        self.prefix_scan
    }
}
