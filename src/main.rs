//! sheetql - run SQL against CSV-backed named ranges with cached results.

use anyhow::{Context, Result};
use serde_json::Value;
use sheetql_core::config::{CacheBackend, Config, default_config_path};
use sheetql_core::storage::{OutputFormat, import_csv, render};
use sheetql_core::{CacheKeySelector, CellRef, Queryable, Services, Workbook};
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum ArgError {
    #[error("{0} requires a value")]
    MissingValue(String),
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("Unexpected argument: {0}")]
    Unexpected(String),
    #[error("No SQL statement given")]
    MissingSql,
}

#[derive(Debug, Default)]
struct Options {
    sql: String,
    /// `(range name, csv path)` in command-line order.
    workbooks: Vec<(String, PathBuf)>,
    params: Option<String>,
    cache_key: Option<String>,
    functions: Vec<PathBuf>,
    format: OutputFormat,
    config: Option<PathBuf>,
    memory_cache: bool,
}

fn print_usage() {
    eprintln!("Usage: sheetql [OPTIONS] <SQL>");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <SQL>                     Statement(s) to run, e.g. \"SELECT * FROM RANGE('sales')\"");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -w, --workbook <[NAME=]FILE>  Load a CSV file as a named range (can be repeated)");
    eprintln!("  -p, --params <JSON>       Parameters bound to ? and $name");
    eprintln!("  -k, --cache-key <KEY>     Cache the result under KEY (`true` = content hash)");
    eprintln!("  -f, --functions <FILE>    Load custom Rhai functions (can be repeated)");
    eprintln!("  --format <md|csv|json>    Output format (default: md)");
    eprintln!("  --config <FILE>           Config file (default: user config.toml)");
    eprintln!("  --memory-cache            Keep cached results in memory only");
    eprintln!("  -h, --help                Print help");
    if let Some(path) = default_config_path() {
        eprintln!();
        eprintln!("Config: {}", path.display());
    }
}

/// `NAME=FILE`, or `FILE` named after its stem.
fn workbook_arg(arg: &str) -> (String, PathBuf) {
    match arg.split_once('=') {
        Some((name, file)) if !name.is_empty() => (name.to_string(), PathBuf::from(file)),
        _ => {
            let path = PathBuf::from(arg);
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| arg.to_string());
            (name, path)
        }
    }
}

/// `Ok(None)` when help was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut opts = Options::default();
    let mut sql: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut value = || -> Result<String, ArgError> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| ArgError::MissingValue(arg.to_string()))
        };
        match arg {
            "-h" | "--help" => return Ok(None),
            "-w" | "--workbook" => opts.workbooks.push(workbook_arg(&value()?)),
            "-p" | "--params" => opts.params = Some(value()?),
            "-k" | "--cache-key" => opts.cache_key = Some(value()?),
            "-f" | "--functions" => opts.functions.push(PathBuf::from(value()?)),
            "--format" => opts.format = value()?.parse()?,
            "--config" => opts.config = Some(PathBuf::from(value()?)),
            "--memory-cache" => opts.memory_cache = true,
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(ArgError::UnknownOption(other.to_string()).into());
            }
            other => {
                if sql.is_some() {
                    return Err(ArgError::Unexpected(other.to_string()).into());
                }
                sql = Some(other.to_string());
            }
        }
        i += 1;
    }

    opts.sql = sql.ok_or(ArgError::MissingSql)?;
    Ok(Some(opts))
}

/// Each file lands two columns right of everything loaded before it.
fn load_workbook(files: &[(String, PathBuf)]) -> Result<Workbook> {
    let workbook = Workbook::new();
    for (name, path) in files {
        let origin = workbook
            .used_range()
            .map(|used| CellRef::new(used.end.col + 2, 0))
            .unwrap_or(CellRef::new(0, 0));
        let range = import_csv(&workbook, path, origin, name)
            .with_context(|| format!("loading {}", path.display()))?;
        info!(name = %name, range = %range, "loaded workbook range");
    }
    Ok(workbook)
}

fn run(opts: Options) -> Result<Option<String>> {
    let mut config = Config::load_or_default(opts.config.as_deref())?;
    if opts.memory_cache {
        config.cache.backend = CacheBackend::Memory;
    }
    debug!(?config, "configuration loaded");

    let mut builder = Services::builder().config(config);
    for path in &opts.functions {
        builder = builder.script(path);
    }
    let services = builder.build()?;

    let workbook = load_workbook(&opts.workbooks)?;
    let params: Value = match &opts.params {
        Some(raw) => serde_json::from_str(raw).context("--params is not valid JSON")?,
        None => Value::Null,
    };
    let selector = opts
        .cache_key
        .as_deref()
        .map(CacheKeySelector::parse)
        .unwrap_or_default();

    let queryable = Queryable::for_workbook(workbook, &services)?;
    let output = queryable.query_any(&opts.sql, selector, &params)?;
    Ok(output
        .map(|output| render(&output, opts.format))
        .transpose()?)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = match parse_args(&args) {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    init_tracing();

    match run(opts) {
        Ok(Some(text)) => println!("{}", text.trim_end_matches('\n')),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
