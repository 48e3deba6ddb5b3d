//! Integration tests driving the sheetql binary.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// A scratch directory with two CSV files and an empty config, so runs do
/// not depend on the user's config.toml.
fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("parts.csv"), "name,qty\nbolt,3\nnut,1\nwasher,12\n").unwrap();
    fs::write(dir.path().join("prices.csv"), "item,price\nbolt,0.25\nnut,0.1\n").unwrap();
    fs::write(dir.path().join("config.toml"), "").unwrap();
    dir
}

fn run_command(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_sheetql"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--memory-cache")
        .args(args)
        .output()
        .expect("Failed to execute sheetql");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

#[test]
fn test_markdown_output() {
    let dir = fixture();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-w",
            "parts.csv",
            "SELECT name, qty FROM RANGE('parts') ORDER BY qty",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(
        stdout.trim(),
        "| name | qty |\n|---|---|\n| nut | 1 |\n| bolt | 3 |\n| washer | 12 |"
    );
}

#[test]
fn test_csv_output_with_params() {
    let dir = fixture();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-w",
            "stock=parts.csv",
            "--format",
            "csv",
            "-p",
            r#"{"min": 2}"#,
            "SELECT name FROM RANGE('stock') WHERE qty >= $min ORDER BY name",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "name\nbolt\nwasher");
}

#[test]
fn test_json_output_and_cache_key() {
    let dir = fixture();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-w",
            "parts.csv",
            "-k",
            "true",
            "--format",
            "json",
            "SELECT SUM(qty) AS total FROM RANGE('parts')",
        ],
    );
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value, serde_json::json!([{"total": 16}]));
}

#[test]
fn test_join_across_workbooks() {
    let dir = fixture();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-w",
            "parts.csv",
            "-w",
            "prices.csv",
            "--format",
            "csv",
            "SELECT p.name, p.qty * c.price AS cost FROM RANGE('parts') p \
             LEFT JOIN RANGE('prices') c ON p.name = c.item ORDER BY p.name",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "name,cost\nbolt,0.75\nnut,0.1\nwasher,");
}

#[test]
fn test_write_prints_count() {
    let dir = fixture();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-w",
            "parts.csv",
            "SELECT qty, name INTO RANGE('parts') FROM RANGE('parts') WHERE qty > 2; \
             SELECT COUNT(*) AS n FROM RANGE('parts')",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "| n |\n|---|\n| 2 |");

    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-w",
            "parts.csv",
            "INSERT INTO RANGE('parts') SELECT name, qty FROM RANGE('parts') WHERE qty < 5",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2");
}

#[test]
fn test_custom_functions() {
    let dir = fixture();
    let script = dir.path().join("double.rhai");
    fs::write(&script, "fn double(x) { x * 2 }\n").unwrap();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "config.toml",
            "-f",
            script.to_str().unwrap(),
            "--format",
            "csv",
            "SELECT DOUBLE(21) AS x",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "x\n42");
}

#[test]
fn test_exchange_uses_configured_rates() {
    let dir = fixture();
    fs::write(
        dir.path().join("rates.toml"),
        "[rates]\nbase = \"USD\"\n\n[rates.table]\nEUR = 0.5\n",
    )
    .unwrap();
    let (stdout, _, code) = run_command(
        dir.path(),
        &[
            "--config",
            "rates.toml",
            "--format",
            "csv",
            "SELECT EXCHANGE(10, 'USD', 'EUR') AS eur",
        ],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "eur\n5");
}

#[test]
fn test_unknown_range_exit_code() {
    let dir = fixture();
    let (stdout, stderr, code) = run_command(
        dir.path(),
        &["--config", "config.toml", "SELECT * FROM RANGE('missing')"],
    );
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Unknown named range: missing"));
}

#[test]
fn test_bad_arguments() {
    let dir = fixture();
    let (_, stderr, code) = run_command(dir.path(), &["--bogus", "SELECT 1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown option: --bogus"));

    let (_, stderr, code) = run_command(dir.path(), &["--help"]);
    assert_eq!(code, 0);
    assert!(stderr.contains("Usage: sheetql"));
}
