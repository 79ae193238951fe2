//! Regional forecast: one random forest per region, applied to extrapolated
//! budget and population figures for the following years.

use serde::Serialize;

use crate::columns::ColumnMap;
use crate::error::{ForecastError, Result};
use crate::features::{extrapolate, FeatureRow, GrowthAssumptions};
use crate::forest::{ForestOptions, RandomForest};
use crate::metrics::HoldoutScore;
use crate::table::Table;

/// Which part of a region's history the forest is fitted on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainingWindow {
    /// Fit on the chronologically first rows and score on the last
    /// `ceil(test_fraction * n)` rows.
    Holdout { test_fraction: f64 },
    /// Fit on every row.
    FullHistory,
}

impl Default for TrainingWindow {
    fn default() -> Self {
        TrainingWindow::Holdout { test_fraction: 0.2 }
    }
}

impl std::str::FromStr for TrainingWindow {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "holdout" | "split" => Ok(TrainingWindow::default()),
            "full" | "full_history" | "all" => Ok(TrainingWindow::FullHistory),
            _ => Err(ForecastError::InvalidParameter {
                param: "fit_on".into(),
                value: s.to_string(),
                reason: "expected 'holdout' or 'full'".into(),
            }),
        }
    }
}

impl TrainingWindow {
    /// Number of training rows for a region with `n` rows.
    pub fn n_train(&self, n: usize) -> Result<usize> {
        match *self {
            TrainingWindow::FullHistory => {
                if n == 0 {
                    return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
                }
                Ok(n)
            }
            TrainingWindow::Holdout { test_fraction } => {
                if !(test_fraction > 0.0 && test_fraction < 1.0) {
                    return Err(ForecastError::InvalidParameter {
                        param: "test_fraction".into(),
                        value: test_fraction.to_string(),
                        reason: "must be in (0, 1)".into(),
                    });
                }
                let n_train = n - n_test(n, test_fraction);
                if n_train == 0 {
                    let needed = (1..)
                        .find(|&m| m - n_test(m, test_fraction) >= 1)
                        .unwrap_or(usize::MAX);
                    return Err(ForecastError::InsufficientData { needed, got: n });
                }
                Ok(n_train)
            }
        }
    }
}

fn n_test(n: usize, test_fraction: f64) -> usize {
    ((test_fraction * n as f64).ceil() as usize).min(n)
}

/// What to do when a single region's rows cannot be forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionPolicy {
    /// Fail the whole regional forecast.
    #[default]
    Abort,
    /// Leave the region out and report it in [`RegionalForecast::skipped`].
    Skip,
}

impl std::str::FromStr for RegionPolicy {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(RegionPolicy::Abort),
            "skip" => Ok(RegionPolicy::Skip),
            _ => Err(ForecastError::InvalidParameter {
                param: "on_invalid_region".into(),
                value: s.to_string(),
                reason: "expected 'abort' or 'skip'".into(),
            }),
        }
    }
}

/// Regional forecast options.
#[derive(Debug, Clone)]
pub struct RegionalOptions {
    pub columns: ColumnMap,
    pub forest: ForestOptions,
    pub growth: GrowthAssumptions,
    pub fit_on: TrainingWindow,
    pub on_invalid_region: RegionPolicy,
    /// Number of future years
    pub horizon: usize,
}

impl Default for RegionalOptions {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            forest: ForestOptions::default(),
            growth: GrowthAssumptions::default(),
            fit_on: TrainingWindow::default(),
            on_invalid_region: RegionPolicy::default(),
            horizon: 3,
        }
    }
}

/// One forecast year of one region, with the features it was predicted from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionalRecord {
    #[serde(rename = "Année")]
    pub year: i32,
    #[serde(rename = "Budget_Santé")]
    pub budget: f64,
    #[serde(rename = "Population")]
    pub population: f64,
    #[serde(rename = "Croissance")]
    pub growth: f64,
    #[serde(rename = "Dépenses_Prédites")]
    pub predicted: f64,
    #[serde(rename = "Région")]
    pub region: String,
}

/// Forecast of a single region.
#[derive(Debug, Clone)]
pub struct RegionForecast {
    pub region: String,
    pub n_train: usize,
    /// Score on the held-out rows, when any were held out
    pub holdout: Option<HoldoutScore>,
    pub records: Vec<RegionalRecord>,
}

/// A region left out under [`RegionPolicy::Skip`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    pub region: String,
    pub reason: String,
}

/// Result of the regional forecaster.
#[derive(Debug, Clone, Default)]
pub struct RegionalForecast {
    pub regions: Vec<RegionForecast>,
    pub skipped: Vec<SkippedRegion>,
}

impl RegionalForecast {
    /// All records, region by region in visiting order.
    pub fn records(&self) -> Vec<RegionalRecord> {
        self.regions
            .iter()
            .flat_map(|r| r.records.iter().cloned())
            .collect()
    }
}

struct ColumnIndices {
    features: [usize; 4],
    expenditure: usize,
}

/// Forecast expenditure for every region of `table`.
///
/// Rows are ordered by (region, year); regions are visited in that order.
pub fn forecast_regional(table: &Table, options: &RegionalOptions) -> Result<RegionalForecast> {
    let columns = &options.columns;
    let keys = table.require(&[columns.region.as_str(), columns.year.as_str()], None)?;
    let (region_col, year_col) = (keys[0], keys[1]);

    let mut rows: Vec<(String, i32, usize)> = (0..table.n_rows())
        .map(|row| -> Result<(String, i32, usize)> {
            Ok((table.label(row, region_col)?, table.year(row, year_col)?, row))
        })
        .collect::<Result<_>>()?;
    rows.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

    let mut result = RegionalForecast::default();
    for group in rows.chunk_by(|a, b| a.0 == b.0) {
        let region = group[0].0.as_str();

        // Absent header columns are absent for every region.
        let idx = table.require(&columns.regional_required(), Some(region))?;
        let indices = ColumnIndices {
            features: [idx[0], idx[1], idx[2], idx[3]],
            expenditure: idx[4],
        };

        match forecast_region(table, region, group, &indices, options) {
            Ok(forecast) => result.regions.push(forecast),
            Err(e) if options.on_invalid_region == RegionPolicy::Skip && e.is_region_local() => {
                tracing::warn!(region, error = %e, "skipping region");
                result.skipped.push(SkippedRegion {
                    region: region.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        regions = result.regions.len(),
        skipped = result.skipped.len(),
        "regional forecast complete"
    );

    Ok(result)
}

fn forecast_region(
    table: &Table,
    region: &str,
    group: &[(String, i32, usize)],
    indices: &ColumnIndices,
    options: &RegionalOptions,
) -> Result<RegionForecast> {
    let [_, budget_col, population_col, growth_col] = indices.features;

    let mut history = Vec::with_capacity(group.len());
    let mut target = Vec::with_capacity(group.len());
    for &(_, year, row) in group {
        history.push(FeatureRow {
            year,
            budget: table.number(row, budget_col)?,
            population: table.number(row, population_col)?,
            growth: table.number(row, growth_col)?,
        });
        target.push(table.number(row, indices.expenditure)?);
    }

    let n = history.len();
    let n_train = options.fit_on.n_train(n)?;
    let x: Vec<Vec<f64>> = history.iter().map(|r| r.to_array().to_vec()).collect();

    let forest = RandomForest::fit(&x[..n_train], &target[..n_train], &options.forest)?;

    let holdout = if n_train < n {
        let predicted = forest.predict(&x[n_train..])?;
        Some(HoldoutScore::compute(&target[n_train..], &predicted)?)
    } else {
        None
    };

    let last = history[n - 1];
    let future = extrapolate(&last, options.horizon, &options.growth);
    let future_x: Vec<Vec<f64>> = future.iter().map(|r| r.to_array().to_vec()).collect();
    let predicted = forest.predict(&future_x)?;

    tracing::debug!(
        region,
        rows = n,
        n_train,
        trees = forest.n_trees(),
        depth = forest.max_depth(),
        holdout_mae = holdout.map(|s| s.mae),
        "fitted regional forest"
    );

    let records = future
        .iter()
        .zip(predicted)
        .map(|(row, value)| RegionalRecord {
            year: row.year,
            budget: row.budget,
            population: row.population,
            growth: row.growth,
            predicted: value,
            region: region.to_string(),
        })
        .collect();

    Ok(RegionForecast {
        region: region.to_string(),
        n_train,
        holdout,
        records,
    })
}
