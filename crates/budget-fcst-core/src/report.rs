//! Result envelopes and the merged report.
//!
//! Every forecaster entry point returns an [`Outcome`]: either its records or
//! an [`ErrorReport`]. Errors and panics are both caught at that boundary, so
//! callers always receive something they can serialize.
//!
//! On the wire an outcome is untagged: a success is the bare record list and a
//! failure is `{"error": ..., "trace": ...}`.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use serde::Serialize;

use crate::error::{ForecastError, Result};
use crate::national::{forecast_national, NationalOptions, NationalRecord};
use crate::regional::{forecast_regional, RegionalOptions, RegionalRecord};
use crate::table::Table;

/// Error payload emitted in place of a result.
///
/// `trace` is an operator diagnostic; its layout is not stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub trace: String,
}

impl ErrorReport {
    /// Build a report from an error, walking its `source()` chain.
    pub fn from_error(operation: &str, path: &Path, err: &ForecastError) -> Self {
        let mut trace = format!(
            "{} ({})\nerror[{}]: {}\n",
            operation,
            path.display(),
            err.kind(),
            err
        );
        let mut source = StdError::source(err);
        while let Some(cause) = source {
            trace.push_str(&format!("  caused by: {}\n", cause));
            source = cause.source();
        }
        append_backtrace(&mut trace);

        Self {
            error: error_message(err),
            trace,
        }
    }

    fn from_panic(operation: &str, path: &Path, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self {
            error: format!("Panic in {}: {}", operation, message),
            trace: format!("{} ({})\npanic: {}\n", operation, path.display(), message),
        }
    }
}

/// Top-level message: the error and its causes on one line.
fn error_message(err: &ForecastError) -> String {
    let mut message = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn append_backtrace(trace: &mut String) {
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        trace.push_str("\nstack backtrace:\n");
        trace.push_str(&backtrace.to_string());
    }
}

/// Success or failure of one forecaster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Success(T),
    Failure(ErrorReport),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ErrorReport> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(r) => Some(r),
        }
    }
}

/// Run `f`, turning errors and panics into [`Outcome::Failure`].
pub fn guarded<T, F>(operation: &str, path: &Path, f: F) -> Outcome<T>
where
    F: FnOnce() -> Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(e)) => {
            tracing::error!(operation, kind = e.kind(), error = %e, "forecast failed");
            Outcome::Failure(ErrorReport::from_error(operation, path, &e))
        }
        Err(payload) => {
            tracing::error!(operation, "forecast panicked");
            Outcome::Failure(ErrorReport::from_panic(operation, path, payload.as_ref()))
        }
    }
}

fn regional_records(table: &Table, options: &RegionalOptions) -> Result<Vec<RegionalRecord>> {
    Ok(forecast_regional(table, options)?.records())
}

/// Load `path` and run the regional forecaster.
pub fn run_regional(path: &Path, options: &RegionalOptions) -> Outcome<Vec<RegionalRecord>> {
    guarded("forecast_regional", path, || {
        let table = Table::load(path)?;
        regional_records(&table, options)
    })
}

/// Load `path` and run the national forecaster.
pub fn run_national(path: &Path, options: &NationalOptions) -> Outcome<Vec<NationalRecord>> {
    guarded("forecast_national", path, || {
        let table = Table::load(path)?;
        forecast_national(&table, options)
    })
}

/// Options of both forecasters.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub regional: RegionalOptions,
    pub national: NationalOptions,
}

/// Both forecasts side by side. Either slot may hold an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedReport {
    pub forecast_regional: Outcome<Vec<RegionalRecord>>,
    pub forecast_national: Outcome<Vec<NationalRecord>>,
}

/// Run both forecasters over one load of `path`.
///
/// A failure in one forecaster never prevents the other from running. If the
/// input cannot be loaded, both slots carry the load error.
pub fn merge_forecasts(path: &Path, options: &MergeOptions) -> Outcome<MergedReport> {
    guarded("merge_forecasts", path, || {
        let report = match Table::load(path) {
            Ok(table) => MergedReport {
                forecast_regional: guarded("forecast_regional", path, || {
                    regional_records(&table, &options.regional)
                }),
                forecast_national: guarded("forecast_national", path, || {
                    forecast_national(&table, &options.national)
                }),
            },
            Err(e) => {
                tracing::error!(kind = e.kind(), error = %e, "failed to load input");
                MergedReport {
                    forecast_regional: Outcome::Failure(ErrorReport::from_error(
                        "forecast_regional",
                        path,
                        &e,
                    )),
                    forecast_national: Outcome::Failure(ErrorReport::from_error(
                        "forecast_national",
                        path,
                        &e,
                    )),
                }
            }
        };
        tracing::info!(
            regional_ok = report.forecast_regional.is_success(),
            national_ok = report.forecast_national.is_success(),
            "merged forecasts"
        );
        Ok(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn synthetic_csv() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "Région,Année,Budget_Santé,Population,Croissance,Dépenses_Santé"
        )
        .unwrap();
        for region in ["A", "B"] {
            for (i, year) in (2018..=2023).enumerate() {
                let i = i as f64;
                writeln!(
                    file,
                    "{},{},{},{},{},{}",
                    region,
                    year,
                    1000.0 + 50.0 * i,
                    10000.0 + 100.0 * i,
                    2.0,
                    500.0 + 25.0 * i
                )
                .unwrap();
            }
        }
        file
    }

    #[test]
    fn test_guarded_success_and_error() {
        let path = Path::new("in.csv");
        let ok = guarded("op", path, || Ok(5));
        assert_eq!(ok, Outcome::Success(5));

        let err: Outcome<i32> = guarded("op", path, || {
            Err(ForecastError::InsufficientData { needed: 2, got: 1 })
        });
        let report = err.failure().unwrap();
        assert_eq!(
            report.error,
            "Insufficient data: need at least 2 observations, got 1"
        );
        assert!(report.trace.starts_with("op (in.csv)"));
        assert!(report.trace.contains("insufficient_data"));
    }

    #[test]
    fn test_guarded_catches_panic() {
        let outcome: Outcome<()> = guarded("op", Path::new("x.csv"), || panic!("boom"));
        let report = outcome.failure().unwrap();
        assert_eq!(report.error, "Panic in op: boom");
        assert!(report.trace.contains("panic: boom"));
    }

    #[test]
    fn test_untagged_serialization() {
        let ok: Outcome<Vec<i32>> = Outcome::Success(vec![1, 2]);
        assert_eq!(serde_json::to_string(&ok).unwrap(), "[1,2]");

        let failed: Outcome<Vec<i32>> = Outcome::Failure(ErrorReport {
            error: "e".into(),
            trace: "t".into(),
        });
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"error":"e","trace":"t"}"#
        );
    }

    #[test]
    fn test_missing_file_reports_cause() {
        let path = Path::new("/no/such/dir/budget.csv");
        let outcome = run_regional(path, &RegionalOptions::default());
        let report = outcome.failure().unwrap();
        assert!(report.error.starts_with("Failed to read /no/such/dir/budget.csv: "));
        assert!(report.trace.contains("caused by:"));

        let outcome = run_national(path, &NationalOptions::default());
        assert!(!outcome.failure().unwrap().trace.is_empty());
    }

    #[test]
    fn test_merge_end_to_end() {
        let file = synthetic_csv();
        let outcome = merge_forecasts(file.path(), &MergeOptions::default());
        let report = outcome.success().unwrap();

        assert_eq!(report.forecast_regional.success().unwrap().len(), 6);
        assert_eq!(report.forecast_national.success().unwrap().len(), 3);

        let json = serde_json::to_value(report).unwrap();
        assert!(json.get("error").is_none());
        assert!(json["forecast_regional"].is_array());
        assert!(json["forecast_national"].is_array());
    }

    #[test]
    fn test_merge_matches_individual_runs() {
        let file = synthetic_csv();
        let merged = merge_forecasts(file.path(), &MergeOptions::default());
        let report = merged.success().unwrap();
        assert_eq!(
            report.forecast_regional,
            run_regional(file.path(), &RegionalOptions::default())
        );
        assert_eq!(
            report.forecast_national,
            run_national(file.path(), &NationalOptions::default())
        );
    }

    #[test]
    fn test_merge_keeps_both_slots_on_load_failure() {
        let outcome = merge_forecasts(Path::new("/missing.csv"), &MergeOptions::default());
        let report = outcome.success().unwrap();
        assert!(report.forecast_regional.failure().is_some());
        assert!(report.forecast_national.failure().is_some());
    }

    #[test]
    fn test_merge_regional_failure_does_not_block_national() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Région,Année,Budget_Santé,Population,Croissance").unwrap();
        writeln!(file, "A,2020,1,1,1").unwrap();
        let mut file2 = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file2, "Région,Année,Dépenses_Santé").unwrap();
        for year in 2018..=2022 {
            writeln!(file2, "A,{},{}", year, year - 2000).unwrap();
        }

        // Expenditure missing: both fail, each in its own slot.
        let report = merge_forecasts(file.path(), &MergeOptions::default());
        let report = report.success().unwrap();
        let regional_err = &report.forecast_regional.failure().unwrap().error;
        assert!(regional_err.contains("Missing columns for region A"));
        assert!(report.forecast_national.failure().is_some());

        // Regional features missing: national still succeeds.
        let report = merge_forecasts(file2.path(), &MergeOptions::default());
        let report = report.success().unwrap();
        assert!(report.forecast_regional.failure().is_some());
        assert_eq!(report.forecast_national.success().unwrap().len(), 3);
    }
}
