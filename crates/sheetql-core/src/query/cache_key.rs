//! Content hash identifying a cacheable query.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sheetql_engine::engine::value::number;

/// Whether, and under what discriminator, a query result is cached.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKeySelector {
    /// Never read or write the cache.
    #[default]
    None,
    /// Cache under a hash of the query text and parameters alone.
    Content,
    /// Cache separately per caller-supplied discriminator.
    Named(String),
}

impl CacheKeySelector {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CacheKeySelector::None)
    }

    /// Parse a command-line style selector: `true`, `false`/empty, or a name.
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "" | "false" => CacheKeySelector::None,
            "true" => CacheKeySelector::Content,
            name => CacheKeySelector::Named(name.to_string()),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            CacheKeySelector::None => Value::Bool(false),
            CacheKeySelector::Content => Value::Bool(true),
            CacheKeySelector::Named(name) => Value::String(name.clone()),
        }
    }
}

impl From<bool> for CacheKeySelector {
    fn from(enabled: bool) -> Self {
        if enabled {
            CacheKeySelector::Content
        } else {
            CacheKeySelector::None
        }
    }
}

impl From<&str> for CacheKeySelector {
    fn from(name: &str) -> Self {
        CacheKeySelector::Named(name.to_string())
    }
}

impl From<String> for CacheKeySelector {
    fn from(name: String) -> Self {
        CacheKeySelector::Named(name)
    }
}

/// Serialize `value` with object keys sorted at every level.
///
/// Whole floats print as integers so `1.0` and `1` hash alike.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Number(n) if n.is_f64() => {
            let normalised = n.as_f64().map(number).unwrap_or(Value::Null);
            out.push_str(&normalised.to_string());
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 (hex) of the canonical `[sql, selector, parameters]` triple.
pub fn query_cache_key(sql: &str, selector: &CacheKeySelector, parameters: &Value) -> String {
    let triple = Value::Array(vec![
        Value::String(sql.to_string()),
        selector.to_value(),
        parameters.clone(),
    ]);
    let digest = Sha256::digest(canonical_json(&triple).as_bytes());
    hex::encode(digest)
}
