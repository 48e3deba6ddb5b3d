//! Markdown table rendering of row sets.

use sheetql_engine::RowSet;
use sheetql_engine::engine::value::to_text;

/// A GitHub-style table: header, separator, one line per row.
pub fn write_markdown(rows: &RowSet) -> String {
    if rows.columns.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push('|');
    for column in &rows.columns {
        out.push_str(&format!(" {} |", escape_markdown(column)));
    }
    out.push('\n');
    out.push('|');
    for _ in &rows.columns {
        out.push_str("---|");
    }
    out.push('\n');
    for row in &rows.rows {
        out.push('|');
        for column in &rows.columns {
            let value = row.get(column).map(to_text).unwrap_or_default();
            out.push_str(&format!(" {} |", escape_markdown(&value)));
        }
        out.push('\n');
    }
    out
}

/// Escape special markdown characters in cell content
fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ").replace('\r', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_markdown_table() {
        let rows = RowSet::new(
            vec!["name".into(), "note".into()],
            vec![
                json!({"name": "a", "note": "x|y"}).as_object().cloned().unwrap(),
                json!({"name": "b"}).as_object().cloned().unwrap(),
            ],
        );
        assert_eq!(
            write_markdown(&rows),
            "| name | note |\n|---|---|\n| a | x\\|y |\n| b |  |\n"
        );
    }

    #[test]
    fn test_no_columns_renders_nothing() {
        assert_eq!(write_markdown(&RowSet::default()), "");
    }
}
