//! CSV import into a workbook and CSV rendering of row sets.

use sheetql_engine::RowSet;
use sheetql_engine::engine::value::to_text;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, SheetqlError};
use crate::workbook::{CellRef, CellValue, RangeRef, Workbook};

/// Read a CSV file into `workbook` at `origin` and name the area `name`.
pub fn import_csv(workbook: &Workbook, path: &Path, origin: CellRef, name: &str) -> Result<RangeRef> {
    let content = std::fs::read_to_string(path)?;
    import_csv_str(workbook, &content, origin, name)
}

/// Write CSV text into `workbook` at `origin`, then bind `name` to the
/// rectangle it covers (header row included).
pub fn import_csv_str(workbook: &Workbook, content: &str, origin: CellRef, name: &str) -> Result<RangeRef> {
    let mut lines: Vec<&str> = content.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return Err(SheetqlError::EmptyRange(name.to_string()));
    }

    let rows: Vec<Vec<CellValue>> = lines
        .iter()
        .map(|line| parse_csv_line(line).iter().map(|f| parse_csv_field(f)).collect())
        .collect();
    let width = rows.iter().map(Vec::len).max().unwrap_or(1);
    workbook.write_range(origin, &rows);

    let range = RangeRef::new(
        origin,
        CellRef::new(origin.col + width - 1, origin.row + rows.len() - 1),
    );
    workbook.define_name(name, range);
    debug!(name, range = %range, "imported CSV");
    Ok(range)
}

/// Parse a single CSV line, handling quoted fields
pub(crate) fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => {
                    in_quotes = true;
                    field_was_quoted = true;
                }
                ',' => {
                    let field = std::mem::take(&mut current);
                    fields.push(if field_was_quoted { field } else { field.trim().to_string() });
                    field_was_quoted = false;
                }
                _ => current.push(c),
            }
        }
    }
    fields.push(if field_was_quoted { current } else { current.trim().to_string() });
    fields
}

/// Numbers become numbers unless written with leading zeros ("007"),
/// TRUE/FALSE become booleans, and anything else stays text.
pub(crate) fn parse_csv_field(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Empty;
    }

    // Quoted fields keep their surrounding whitespace.
    let trimmed = field.trim();
    if field != trimmed {
        return CellValue::Text(field.to_string());
    }

    if trimmed.starts_with('0')
        && trimmed.len() > 1
        && !trimmed.starts_with("0.")
        && trimmed.chars().nth(1).is_some_and(|c| c.is_ascii_digit())
    {
        return CellValue::Text(trimmed.to_string());
    }

    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return CellValue::Number(n);
        }
    }

    match trimmed.to_ascii_uppercase().as_str() {
        "TRUE" => CellValue::Bool(true),
        "FALSE" => CellValue::Bool(false),
        _ => CellValue::Text(trimmed.to_string()),
    }
}

/// Header line plus one line per row, columns in the set's order.
pub fn write_csv(rows: &RowSet) -> String {
    let mut out = String::new();
    let header: Vec<String> = rows.columns.iter().map(|c| escape_csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &rows.rows {
        let fields: Vec<String> = rows
            .columns
            .iter()
            .map(|c| escape_csv_field(&row.get(c).map(to_text).unwrap_or_default()))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    // Guard against CSV formula injection in spreadsheet apps.
    let first_non_space = field.trim_start_matches([' ', '\t']).chars().next();
    let safe_field = if matches!(first_non_space, Some('=' | '+' | '-' | '@'))
        && field.trim().parse::<f64>().is_err()
    {
        format!("'{}", field)
    } else {
        field.to_string()
    };

    if safe_field.contains(',')
        || safe_field.contains('"')
        || safe_field.contains('\n')
        || safe_field.contains('\r')
    {
        format!("\"{}\"", safe_field.replace('"', "\"\""))
    } else {
        safe_field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_csv_line_quoted() {
        assert_eq!(
            parse_csv_line(r#"a,"hello, world",c"#),
            vec!["a", "hello, world", "c"]
        );
        assert_eq!(
            parse_csv_line(r#"a,"say ""hello""",c"#),
            vec!["a", r#"say "hello""#, "c"]
        );
        assert_eq!(parse_csv_line(r#""  keep me  ",x"#), vec!["  keep me  ", "x"]);
    }

    #[test]
    fn test_parse_csv_field_types() {
        assert_eq!(parse_csv_field("42"), CellValue::Number(42.0));
        assert_eq!(parse_csv_field("007"), CellValue::Text("007".into()));
        assert_eq!(parse_csv_field("0"), CellValue::Number(0.0));
        assert_eq!(parse_csv_field("true"), CellValue::Bool(true));
        assert_eq!(parse_csv_field("nan"), CellValue::Text("nan".into()));
        assert_eq!(parse_csv_field(""), CellValue::Empty);
    }

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field("simple"), "simple");
        assert_eq!(escape_csv_field("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv_field("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv_field(" =1+1"), "' =1+1");
        assert_eq!(escape_csv_field("\t@cmd"), "'\t@cmd");
        assert_eq!(escape_csv_field("-2.5"), "-2.5");
    }

    #[test]
    fn test_import_defines_named_range() {
        let book = Workbook::new();
        let range = import_csv_str(&book, "name,qty\nbolt,3\nnut,\n\n", CellRef::new(2, 0), "parts")
            .unwrap();
        assert_eq!(range.to_string(), "C1:D3");
        assert_eq!(book.named_range("parts").unwrap(), range);
        assert_eq!(book.get(&CellRef::new(3, 1)), CellValue::Number(3.0));
        assert_eq!(book.get(&CellRef::new(3, 2)), CellValue::Empty);
    }

    #[test]
    fn test_import_empty_file_fails() {
        let book = Workbook::new();
        assert!(matches!(
            import_csv_str(&book, "\n", CellRef::new(0, 0), "e"),
            Err(SheetqlError::EmptyRange(_))
        ));
    }

    #[test]
    fn test_import_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a,b").unwrap();
        writeln!(file, "1,2").unwrap();
        let book = Workbook::new();
        let range = import_csv(&book, file.path(), CellRef::new(0, 0), "t").unwrap();
        assert_eq!(range.to_string(), "A1:B2");
    }

    #[test]
    fn test_write_csv_uses_column_order() {
        let rows = RowSet::new(
            vec!["b".into(), "a".into()],
            vec![json!({"a": "x,y", "b": 1.5}).as_object().cloned().unwrap()],
        );
        assert_eq!(write_csv(&rows), "b,a\n1.5,\"x,y\"\n");
    }
}
