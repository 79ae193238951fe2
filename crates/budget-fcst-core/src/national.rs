//! National forecast: expenditure summed over regions, extrapolated by the
//! trend model.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::columns::ColumnMap;
use crate::error::{ForecastError, Result};
use crate::table::{Cell, Table};
use crate::trend::{extend_yearly, TrendModel, TrendOptions};

/// National forecast options.
#[derive(Debug, Clone)]
pub struct NationalOptions {
    pub columns: ColumnMap,
    pub trend: TrendOptions,
    /// Number of future years
    pub horizon: usize,
    /// Attach the prediction interval to each record
    pub include_intervals: bool,
}

impl Default for NationalOptions {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            trend: TrendOptions::default(),
            horizon: 3,
            include_intervals: false,
        }
    }
}

/// One forecast year of the national series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NationalRecord {
    #[serde(rename = "Année")]
    pub year: i32,
    #[serde(rename = "Dépenses_Prédites")]
    pub predicted: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yhat_lower: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yhat_upper: Option<f64>,
}

/// Total expenditure per year, ascending by year.
///
/// Rows whose year or expenditure cell is empty do not contribute.
pub fn aggregate_by_year(table: &Table, columns: &ColumnMap) -> Result<Vec<(i32, f64)>> {
    let idx = table.require(&[columns.year.as_str(), columns.expenditure.as_str()], None)?;
    let (year_col, exp_col) = (idx[0], idx[1]);

    let mut totals: BTreeMap<i32, f64> = BTreeMap::new();
    for row in 0..table.n_rows() {
        if *table.cell(row, year_col) == Cell::Empty {
            continue;
        }
        let year = table.year(row, year_col)?;
        let entry = totals.entry(year).or_insert(0.0);
        if *table.cell(row, exp_col) != Cell::Empty {
            *entry += table.number(row, exp_col)?;
        }
    }
    Ok(totals.into_iter().collect())
}

fn year_start(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| ForecastError::InvalidInput(format!("Year {} is out of range", year)))
}

/// Forecast national expenditure for the `horizon` years after the last
/// observed one.
pub fn forecast_national(table: &Table, options: &NationalOptions) -> Result<Vec<NationalRecord>> {
    let series = aggregate_by_year(table, &options.columns)?;

    let dates = series
        .iter()
        .map(|(year, _)| year_start(*year))
        .collect::<Result<Vec<_>>>()?;
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

    let model = TrendModel::fit(&dates, &values, &options.trend)?;
    let timeline = extend_yearly(&dates, options.horizon)?;
    let predicted = model.predict(&timeline);

    let records: Vec<NationalRecord> = predicted
        .iter()
        .skip(predicted.len() - options.horizon)
        .map(|p| NationalRecord {
            year: p.date.year(),
            predicted: p.yhat,
            yhat_lower: options.include_intervals.then_some(p.yhat_lower),
            yhat_upper: options.include_intervals.then_some(p.yhat_upper),
        })
        .collect();

    tracing::info!(
        years = series.len(),
        changepoints = model.n_changepoints(),
        horizon = options.horizon,
        "national forecast complete"
    );

    Ok(records)
}
