//! Value semantics shared by expressions, built-ins and sorting.
//!
//! Values are plain JSON values. Numbers follow spreadsheet rules rather than
//! JSON's integer/float split: any whole finite result is stored as an integer
//! so `1 + 2` and `1.5 * 2` both compare equal to `3`.

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Normalise a numeric result into a JSON value.
pub fn number(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Numeric view of a value. Strings are parsed, booleans count as 1/0.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

/// JS-style truthiness: null, false, 0 and "" are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text rendering used by string functions and `||`.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) => match number(f) {
                Value::Number(norm) => norm.to_string(),
                _ => n.to_string(),
            },
            None => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used by ORDER BY, MIN and MAX:
/// NULL < booleans < numbers < strings < arrays < objects.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => match type_rank(a).cmp(&type_rank(b)) {
            Ordering::Equal => a.to_string().cmp(&b.to_string()),
            other => other,
        },
    }
}

/// Comparison used by `<`, `=` and friends. `None` means SQL NULL.
///
/// A number against a numeric string compares numerically; anything else of
/// mixed type falls back to the total order.
pub fn sql_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(total_cmp(a, b)),
            }
        }
        _ => Some(total_cmp(a, b)),
    }
}

pub fn sql_eq(a: &Value, b: &Value) -> Option<bool> {
    sql_cmp(a, b).map(|ord| ord == Ordering::Equal)
}

/// Wrap a boolean-or-null comparison result as a value.
pub fn bool_or_null(result: Option<bool>) -> Value {
    result.map(Value::Bool).unwrap_or(Value::Null)
}

/// Case-insensitive SQL LIKE with `%` and `_` wildcards.
///
/// Greedy two-pointer match that backtracks to the last `%`, so no pattern
/// is compiled per row.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, from)) => {
                    p = star + 1;
                    t = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_normalises_whole_values() {
        assert_eq!(number(3.0), json!(3));
        assert_eq!(number(2.5), json!(2.5));
        assert_eq!(number(f64::NAN), Value::Null);
    }

    #[test]
    fn test_truthy_follows_js_rules() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("0")));
        assert!(truthy(&json!(-1)));
    }

    #[test]
    fn test_sql_cmp_mixed_number_and_numeric_string() {
        assert_eq!(sql_eq(&json!(5), &json!("5")), Some(true));
        assert_eq!(sql_cmp(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert_eq!(sql_eq(&json!(null), &json!(1)), None);
    }

    #[test]
    fn test_total_cmp_orders_by_type_rank() {
        let mut values = vec![json!("b"), json!(2), json!(null), json!(true), json!(1)];
        values.sort_by(total_cmp);
        assert_eq!(values, vec![json!(null), json!(true), json!(1), json!(2), json!("b")]);
    }

    #[test]
    fn test_like_wildcards_and_case() {
        assert!(like("Apple pie", "apple%"));
        assert!(like("cat", "c_t"));
        assert!(!like("cart", "c_t"));
        assert!(like("a.b", "a.b"));
        assert!(!like("axb", "a.b"));
    }

    #[test]
    fn test_like_backtracks_across_percent_runs() {
        assert!(like("mississippi", "%iss%ppi"));
        assert!(like("abcabd", "%abd"));
        assert!(!like("abcabc", "%abd"));
        assert!(like("", "%%"));
        assert!(!like("", "_"));
        assert!(like("x", "%_%"));
        assert!(like("ÉCOLE", "é%"));
    }

    #[test]
    fn test_like_treats_regex_metacharacters_literally() {
        assert!(like("a(b", "a(b"));
        assert!(like("[x]*", "[_]*"));
        assert!(!like("x", "[x]"));
        assert!(like("a\\b", "a\\b"));
    }

    #[test]
    fn test_to_text_renders_whole_floats_without_fraction() {
        assert_eq!(to_text(&json!(4.0)), "4");
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!(true)), "true");
    }
}
