//! Namespaced JSON cache over pluggable raw-string backends.

mod entry;
mod file;
mod memory;
mod store;

#[cfg(test)]
mod property_tests;

use std::time::Duration;

use crate::error::Result;

pub use entry::CacheEntry;
pub use file::FileCacheProvider;
pub use memory::MemoryCacheProvider;
pub use store::{ALL_KEYS, Cache};

/// Joins a namespace and key into the backend's physical key.
pub const SEPARATOR: &str = ":";

pub fn physical_key(namespace: &str, key: &str) -> String {
    format!("{}{}{}", namespace, SEPARATOR, key)
}

pub(crate) fn namespace_prefix(namespace: &str) -> String {
    format!("{}{}", namespace, SEPARATOR)
}

/// Raw, namespace-qualified string storage.
pub trait CacheProvider: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Store `value`; with a `ttl` the entry expires no later than that long after the write.
    fn set(&self, namespace: &str, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    fn del(&self, namespace: &str, key: &str) -> Result<()>;

    /// Remove exactly the keys written under `namespace`.
    fn clear(&self, namespace: &str) -> Result<()>;

    /// Whether `clear` can find keys on its own. When false, [`Cache`]
    /// tracks its keys in an index entry.
    fn supports_prefix_scan(&self) -> bool {
        false
    }
}
