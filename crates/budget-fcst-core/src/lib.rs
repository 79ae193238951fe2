//! Core library of the health-budget forecaster.
//!
//! Two independent forecasters read the same input sheet:
//!
//! - [`regional`]: one random forest per region, predicting expenditure from
//!   year, budget, population and growth for the next three years.
//! - [`national`]: expenditure summed over regions per year, extrapolated by a
//!   piecewise-linear trend model.
//!
//! [`report`] wraps both behind panic-safe entry points and merges them.

pub mod columns;
pub mod error;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod national;
pub mod regional;
pub mod report;
pub mod table;
pub mod trend;

// Re-exports for convenience
pub use columns::ColumnMap;
pub use error::{ForecastError, Result};
pub use features::{extrapolate, FeatureRow, GrowthAssumptions};
pub use forest::{ForestOptions, RandomForest};
pub use metrics::{mae, mse, r2, rmse, HoldoutScore};
pub use national::{aggregate_by_year, forecast_national, NationalOptions, NationalRecord};
pub use regional::{
    forecast_regional, RegionForecast, RegionPolicy, RegionalForecast, RegionalOptions,
    RegionalRecord, SkippedRegion, TrainingWindow,
};
pub use report::{
    guarded, merge_forecasts, run_national, run_regional, ErrorReport, MergeOptions,
    MergedReport, Outcome,
};
pub use table::{Cell, InputFormat, Table};
pub use trend::{extend_yearly, TrendModel, TrendOptions, TrendPoint};
