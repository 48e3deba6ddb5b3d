//! Query text preprocessing.
//!
//! Before a query is parsed, every occurrence of [`UNIQUE_ID_PLACEHOLDER`] is
//! replaced with one freshly generated id, quoted as a string literal. All
//! occurrences in one evaluation share the same id, so a query can refer to
//! "this execution" in several places (e.g. a window id passed to
//! `RUNNING_SUM` in both the SELECT list and ORDER BY).

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Token replaced with a per-evaluation unique id.
pub const UNIQUE_ID_PLACEHOLDER: &str = "@@UNIQUE_ID@@";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&regex::escape(UNIQUE_ID_PLACEHOLDER)).expect("placeholder regex must compile")
    })
}

/// Substitute the placeholder with a new random id.
pub fn substitute_unique_id(sql: &str) -> String {
    if !placeholder_re().is_match(sql) {
        return sql.to_string();
    }
    substitute_with(sql, &Uuid::new_v4().to_string())
}

/// Substitute the placeholder with a caller-chosen id.
pub fn substitute_with(sql: &str, id: &str) -> String {
    let literal = format!("'{}'", id.replace('\'', "''"));
    placeholder_re()
        .replace_all(sql, regex::NoExpand(&literal))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_without_placeholder_is_identity() {
        assert_eq!(substitute_unique_id("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_substitute_uses_one_id_per_call() {
        let out = substitute_unique_id("SELECT @@UNIQUE_ID@@ AS a, @@UNIQUE_ID@@ AS b");
        let ids: Vec<&str> = out.split('\'').filter(|s| s.len() == 36).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert!(!out.contains(UNIQUE_ID_PLACEHOLDER));
    }

    #[test]
    fn test_substitute_differs_between_calls() {
        let a = substitute_unique_id("SELECT @@UNIQUE_ID@@");
        let b = substitute_unique_id("SELECT @@UNIQUE_ID@@");
        assert_ne!(a, b);
    }

    #[test]
    fn test_substitute_with_quotes_literal() {
        assert_eq!(substitute_with("x = @@UNIQUE_ID@@", "it's"), "x = 'it''s'");
    }
}
