//! Loading workbooks from files and rendering query output.

mod csv;
mod md;

pub use csv::{import_csv, import_csv_str, write_csv};
pub use md::write_markdown;

use sheetql_engine::QueryOutput;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SheetqlError};

/// How query output is printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = SheetqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(SheetqlError::Config(format!(
                "unknown output format '{}' (expected md, csv or json)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        })
    }
}

/// Render a statement's output. Write counts render as the bare number.
pub fn render(output: &QueryOutput, format: OutputFormat) -> Result<String> {
    let rows = match output {
        QueryOutput::Count(n) => return Ok(n.to_string()),
        QueryOutput::Rows(rows) => rows,
    };
    Ok(match format {
        OutputFormat::Markdown => write_markdown(rows),
        OutputFormat::Csv => write_csv(rows),
        OutputFormat::Json => serde_json::to_string_pretty(&rows.rows)?,
    })
}
