//! End-to-end tests of the `budget-forecast` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const HEADER: &str = "Région,Année,Budget_Santé,Population,Croissance,Dépenses_Santé";

fn sample_rows() -> Vec<String> {
    let mut rows = Vec::new();
    for (region, scale) in [("Nord", 1.0), ("Sud", 1.6)] {
        for (i, year) in (2015..=2022).enumerate() {
            let budget = 1000.0 * scale * (1.0 + 0.04 * i as f64);
            let population = 50_000.0 * scale + 700.0 * i as f64;
            let growth = 1.5 + 0.1 * (i % 3) as f64;
            let spent = 0.9 * budget + 0.002 * population;
            rows.push(format!(
                "{region},{year},{budget:.2},{population:.0},{growth:.2},{spent:.2}"
            ));
        }
    }
    rows
}

fn write_csv(dir: &TempDir, name: &str, header: &str, rows: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut body = String::from(header);
    body.push('\n');
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    std::fs::write(&path, body).unwrap();
    path
}

fn sample_csv(dir: &TempDir) -> PathBuf {
    write_csv(dir, "budget.csv", HEADER, &sample_rows())
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_budget-forecast"))
        .args(args)
        .env_remove("BUDGET_FCST_LOG")
        .output()
        .expect("failed to spawn budget-forecast")
}

fn run_file(path: &Path, extra: &[&str]) -> Output {
    let mut args: Vec<&str> = extra.to_vec();
    args.push(path.to_str().unwrap());
    run(&args)
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_no_arguments_prints_usage() {
    let output = run(&[]);
    assert_eq!(output.status.code(), Some(1));
    let value = stdout_json(&output);
    let message = value["error"].as_str().unwrap();
    assert!(message.starts_with("Usage"));
}

#[test]
fn test_help_exits_cleanly() {
    let output = run(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--fit-on"));
}

#[test]
fn test_merged_forecast() {
    let dir = TempDir::new().unwrap();
    let path = sample_csv(&dir);
    let output = run_file(&path, &[]);
    assert_eq!(output.status.code(), Some(0));

    // Merged output is pretty-printed.
    assert!(String::from_utf8_lossy(&output.stdout).contains("\n  \"forecast_regional\""));

    let value = stdout_json(&output);
    assert!(value.get("error").is_none());

    let regional = value["forecast_regional"].as_array().unwrap();
    assert_eq!(regional.len(), 6);
    let regions: Vec<&str> = regional.iter().map(|r| r["Région"].as_str().unwrap()).collect();
    assert_eq!(regions, ["Nord", "Nord", "Nord", "Sud", "Sud", "Sud"]);
    let years: Vec<i64> = regional.iter().map(|r| r["Année"].as_i64().unwrap()).collect();
    assert_eq!(years, [2023, 2024, 2025, 2023, 2024, 2025]);
    for record in regional {
        assert!(record["Dépenses_Prédites"].as_f64().unwrap().is_finite());
    }

    let national = value["forecast_national"].as_array().unwrap();
    assert_eq!(national.len(), 3);
    let years: Vec<i64> = national.iter().map(|r| r["Année"].as_i64().unwrap()).collect();
    assert_eq!(years, [2023, 2024, 2025]);
    assert!(national[0].get("yhat_lower").is_none());
}

#[test]
fn test_merged_forecast_from_workbook() {
    let workbook =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../budget-fcst-core/tests/fixtures/budget.xlsx");
    let output = run_file(&workbook, &["--trees", "50"]);
    assert_eq!(output.status.code(), Some(0));

    let value = stdout_json(&output);
    let regional = value["forecast_regional"].as_array().unwrap();
    assert_eq!(regional.len(), 6);
    assert_eq!(regional[0]["Région"], "Nord");
    assert_eq!(regional[3]["Région"], "Sud");
    let years: Vec<i64> = regional.iter().map(|r| r["Année"].as_i64().unwrap()).collect();
    assert_eq!(years, [2021, 2022, 2023, 2021, 2022, 2023]);

    let national = value["forecast_national"].as_array().unwrap();
    let years: Vec<i64> = national.iter().map(|r| r["Année"].as_i64().unwrap()).collect();
    assert_eq!(years, [2021, 2022, 2023]);
}

#[test]
fn test_regional_record_key_order() {
    let dir = TempDir::new().unwrap();
    let path = sample_csv(&dir);
    let output = run_file(&path, &["--mode", "regional", "--trees", "20"]);
    assert_eq!(output.status.code(), Some(0));

    let text = String::from_utf8(output.stdout).unwrap();
    let first = text.find('{').unwrap();
    let record = &text[first..text[first..].find('}').unwrap() + first];
    let keys = [
        "Année",
        "Budget_Santé",
        "Population",
        "Croissance",
        "Dépenses_Prédites",
        "Région",
    ];
    let positions: Vec<usize> = keys.iter().map(|k| record.find(k).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let value: Value = serde_json::from_str(&text).unwrap();
    let records = value.as_array().unwrap();
    assert_eq!(records.len(), 6);
    // Budget grows by 5% per year from the last observed row.
    let last_budget = 1000.0 * 1.28;
    let budget = records[0]["Budget_Santé"].as_f64().unwrap();
    assert!((budget - last_budget * 1.05).abs() < 1e-6);
}

#[test]
fn test_national_mode() {
    let dir = TempDir::new().unwrap();
    let path = sample_csv(&dir);
    let output = run_file(&path, &["--mode", "national", "--intervals"]);
    assert_eq!(output.status.code(), Some(0));

    let value = stdout_json(&output);
    let records = value.as_array().unwrap();
    assert_eq!(records.len(), 3);
    for record in records {
        assert!(record["Année"].as_i64().unwrap() > 2022);
        let yhat = record["Dépenses_Prédites"].as_f64().unwrap();
        let lower = record["yhat_lower"].as_f64().unwrap();
        let upper = record["yhat_upper"].as_f64().unwrap();
        assert!(lower <= yhat && yhat <= upper);
    }
}

#[test]
fn test_runs_are_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = sample_csv(&dir);
    let first = run_file(&path, &["--trees", "30"]);
    let second = run_file(&path, &["--trees", "30"]);
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_missing_file_is_reported_in_both_slots() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.csv");
    let output = run_file(&path, &[]);
    assert_eq!(output.status.code(), Some(0));

    let value = stdout_json(&output);
    for slot in ["forecast_regional", "forecast_national"] {
        let error = value[slot]["error"].as_str().unwrap();
        let trace = value[slot]["trace"].as_str().unwrap();
        assert!(!error.is_empty());
        assert!(!trace.is_empty());
    }
}

#[test]
fn test_missing_expenditure_column() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<String> = sample_rows()
        .iter()
        .map(|r| r.rsplit_once(',').unwrap().0.to_string())
        .collect();
    let header = "Région,Année,Budget_Santé,Population,Croissance";
    let path = write_csv(&dir, "partial.csv", header, &rows);

    let output = run_file(&path, &[]);
    assert_eq!(output.status.code(), Some(0));
    let value = stdout_json(&output);
    for slot in ["forecast_regional", "forecast_national"] {
        let error = value[slot]["error"].as_str().unwrap();
        assert!(error.contains("Missing columns"), "{slot}: {error}");
        assert!(error.contains("Dépenses_Santé"));
    }
}

#[test]
fn test_column_mapping() {
    let dir = TempDir::new().unwrap();
    let header = "region,year,budget,population,growth,spent";
    let path = write_csv(&dir, "english.csv", header, &sample_rows());
    let mapping = dir.path().join("columns.json");
    std::fs::write(
        &mapping,
        r#"{"region":"region","year":"year","budget":"budget",
            "population":"population","growth":"growth","expenditure":"spent"}"#,
    )
    .unwrap();

    let mapped = run_file(&path, &["--columns", mapping.to_str().unwrap()]);
    assert_eq!(mapped.status.code(), Some(0));

    let default = run_file(&sample_csv(&dir), &[]);
    // Output keys are canonical whatever the input headers are.
    assert_eq!(mapped.stdout, default.stdout);
}

#[test]
fn test_invalid_option_value() {
    let dir = TempDir::new().unwrap();
    let path = sample_csv(&dir);
    let output = run_file(&path, &["--fit-on", "tomorrow"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_json(&output)["error"].is_string());
}

#[test]
fn test_zero_trees_fails_regional_slot_only() {
    let dir = TempDir::new().unwrap();
    let path = sample_csv(&dir);
    let output = run_file(&path, &["--trees", "0"]);
    assert_eq!(output.status.code(), Some(0));

    let value = stdout_json(&output);
    assert!(value["forecast_regional"]["error"].is_string());
    assert_eq!(value["forecast_national"].as_array().unwrap().len(), 3);
}
