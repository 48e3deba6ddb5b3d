//! Stored cache values with optional expiry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A raw cache value plus its expiry as Unix milliseconds.
///
/// Backends that cannot recover the key from where the entry is stored keep
/// the physical key alongside the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    pub fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| {
            let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_ms().saturating_add(millis)
        });
        CacheEntry {
            key: None,
            value: value.into(),
            expires_at,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// An entry is expired once the current time reaches its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| now_ms() >= at)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
