//! Command line front end for the budget forecasters.
//!
//! Parses arguments into forecaster options, runs the selected mode and
//! renders its outcome as a single JSON document for standard output.

pub mod logging;

use std::path::PathBuf;

use budget_fcst_core::{
    merge_forecasts, run_national, run_regional, ColumnMap, ForecastError,
    ForestOptions, MergeOptions, NationalOptions, RegionPolicy, RegionalOptions, TrainingWindow,
};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;

/// Binary name used in the usage message.
pub const BIN_NAME: &str = "budget-forecast";

/// Which forecast to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Both forecasts, as `{forecast_regional, forecast_national}`
    Merged,
    /// Per-region records only
    Regional,
    /// National records only
    National,
}

/// Forecast regional and national health expenditure for the next three years.
#[derive(Debug, Clone, Parser)]
#[command(name = BIN_NAME, version)]
pub struct Cli {
    /// Input sheet (.csv, .tsv, .xlsx, .xls, .ods)
    pub file: PathBuf,

    /// Forecast to emit
    #[arg(long, value_enum, default_value_t = Mode::Merged)]
    pub mode: Mode,

    /// JSON file mapping logical fields to column headers
    #[arg(long, value_name = "JSON")]
    pub columns: Option<PathBuf>,

    /// Trees per regional forest
    #[arg(long, default_value_t = 200)]
    pub trees: usize,

    /// Seed of the forest bootstrap sampler
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fit regional forests on the first 80% of each history ('holdout') or on all of it ('full')
    #[arg(long, value_name = "WINDOW", default_value = "holdout")]
    pub fit_on: TrainingWindow,

    /// What to do with a region whose rows cannot be used ('abort' or 'skip')
    #[arg(long, value_name = "POLICY", default_value = "abort")]
    pub on_invalid_region: RegionPolicy,

    /// Include prediction intervals in national records
    #[arg(long)]
    pub intervals: bool,

    /// Increase log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Build forecaster options from the parsed arguments.
    pub fn merge_options(&self) -> Result<MergeOptions, ForecastError> {
        let columns = match &self.columns {
            Some(path) => ColumnMap::from_json_file(path)?,
            None => ColumnMap::default(),
        };

        let regional = RegionalOptions {
            columns: columns.clone(),
            forest: ForestOptions {
                n_trees: self.trees,
                seed: self.seed,
                ..Default::default()
            },
            fit_on: self.fit_on,
            on_invalid_region: self.on_invalid_region,
            ..Default::default()
        };
        let national = NationalOptions {
            columns,
            include_intervals: self.intervals,
            ..Default::default()
        };

        Ok(MergeOptions { regional, national })
    }
}

/// JSON emitted when the arguments cannot be parsed.
pub fn usage_json() -> String {
    serde_json::json!({ "error": format!("Usage: {} [OPTIONS] <FILE>", BIN_NAME) }).to_string()
}

/// JSON emitted when the arguments parse but cannot be turned into options.
pub fn config_error_json(err: &ForecastError) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.unwrap_or_else(|e| {
        serde_json::json!({
            "error": format!("Failed to render output: {}", e),
            "trace": format!("render_output\nerror: {:?}\n", e),
        })
        .to_string()
    })
}

/// Run the selected mode and render its outcome.
///
/// Forecast failures are part of the rendered document; only option errors
/// are returned as `Err`.
pub fn run(cli: &Cli) -> Result<String, ForecastError> {
    let options = cli.merge_options()?;
    tracing::info!(file = %cli.file.display(), mode = ?cli.mode, "starting forecast");

    let output = match cli.mode {
        Mode::Merged => to_json(&merge_forecasts(&cli.file, &options), true),
        Mode::Regional => to_json(&run_regional(&cli.file, &options.regional), false),
        Mode::National => to_json(&run_national(&cli.file, &options.national), false),
    };
    Ok(output)
}
