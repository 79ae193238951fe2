//! Piecewise-linear trend model for yearly national series.
//!
//! The model follows the trend component of an additive decomposition
//! model: a linear trend whose slope may change at a set of changepoints
//! spread over the first part of the history. Seasonal terms are not
//! modelled; the series this crate forecasts has one point per year.
//!
//! Fitting is a penalised least-squares problem. The changepoint slope
//! adjustments carry a ridge penalty, expressed as extra pseudo-observations
//! appended to the design matrix, so the whole fit is a single OLS solve.

use anofox_regression::prelude::*;
use chrono::{Months, NaiveDate};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{ForecastError, Result};

/// Residual scale the changepoint prior is expressed against.
const NOISE_SCALE: f64 = 0.05;

/// Trend model options.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendOptions {
    /// Upper bound on the number of potential changepoints
    pub n_changepoints: usize,
    /// Share of the history in which changepoints may be placed
    pub changepoint_range: f64,
    /// Flexibility of the trend (larger = slope changes are cheaper)
    pub changepoint_prior_scale: f64,
    /// Width of the prediction interval (0-1)
    pub interval_width: f64,
    /// Fit a within-year seasonal component
    pub yearly_seasonality: bool,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            interval_width: 0.8,
            yearly_seasonality: false,
        }
    }
}

impl TrendOptions {
    fn validate(&self) -> Result<()> {
        if self.yearly_seasonality {
            return Err(ForecastError::InvalidParameter {
                param: "yearly_seasonality".into(),
                value: "true".into(),
                reason: "a yearly series has a single observation per year".into(),
            });
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::InvalidParameter {
                param: "changepoint_range".into(),
                value: self.changepoint_range.to_string(),
                reason: "must be in (0, 1]".into(),
            });
        }
        if !(self.changepoint_prior_scale > 0.0) || !self.changepoint_prior_scale.is_finite() {
            return Err(ForecastError::InvalidParameter {
                param: "changepoint_prior_scale".into(),
                value: self.changepoint_prior_scale.to_string(),
                reason: "must be positive".into(),
            });
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::InvalidParameter {
                param: "interval_width".into(),
                value: self.interval_width.to_string(),
                reason: "must be in (0, 1)".into(),
            });
        }
        Ok(())
    }
}

/// One predicted period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// A fitted trend model.
#[derive(Debug, Clone)]
pub struct TrendModel {
    origin: NaiveDate,
    span_days: f64,
    y_scale: f64,
    /// Changepoint locations on the scaled time axis
    changepoints: Vec<f64>,
    intercept: f64,
    slope: f64,
    deltas: Vec<f64>,
    /// In-sample residual standard deviation (scaled units)
    sigma: f64,
    /// Mean spacing between observations (scaled units)
    step: f64,
    z: f64,
}

impl TrendModel {
    /// Fit the trend to strictly increasing `dates` and their `values`.
    pub fn fit(dates: &[NaiveDate], values: &[f64], options: &TrendOptions) -> Result<Self> {
        options.validate()?;

        if dates.len() != values.len() {
            return Err(ForecastError::InvalidInput(format!(
                "Dates and values must have the same length: {} vs {}",
                dates.len(),
                values.len()
            )));
        }
        let n = dates.len();
        if n < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: n });
        }
        if dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ForecastError::InvalidInput(
                "Dates must be strictly increasing".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(
                "Series contains non-finite values".to_string(),
            ));
        }

        let origin = dates[0];
        let span_days = (dates[n - 1] - origin).num_days() as f64;
        let t: Vec<f64> = dates
            .iter()
            .map(|d| (*d - origin).num_days() as f64 / span_days)
            .collect();

        let y_max = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let y_scale = if y_max > 0.0 { y_max } else { 1.0 };
        let y: Vec<f64> = values.iter().map(|v| v / y_scale).collect();

        let changepoints = place_changepoints(&t, options);
        let k = changepoints.len();
        let n_cols = 2 + k;
        let penalty = NOISE_SCALE / options.changepoint_prior_scale;

        // Rows 0..n are observations, rows n..n+k penalise each slope change.
        let x_mat = faer::Mat::from_fn(n + k, n_cols, |i, j| {
            if i < n {
                design_value(t[i], &changepoints, j)
            } else if j == 2 + (i - n) {
                penalty
            } else {
                0.0
            }
        });
        let y_col = faer::Col::from_fn(n + k, |i| if i < n { y[i] } else { 0.0 });

        let fitted = OlsRegressor::builder()
            .with_intercept(false)
            .build()
            .fit(&x_mat, &y_col)
            .map_err(|e| {
                ForecastError::ComputationError(format!("Failed to fit trend model: {:?}", e))
            })?;

        let coeffs_col = fitted.coefficients();
        let coeffs: Vec<f64> = (0..coeffs_col.nrows()).map(|i| coeffs_col[i]).collect();
        if coeffs.len() != n_cols || coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::ComputationError(
                "Trend model produced non-finite coefficients".to_string(),
            ));
        }

        let normal = Normal::new(0.0, 1.0).map_err(|e| {
            ForecastError::ComputationError(format!("Failed to build normal distribution: {:?}", e))
        })?;
        let z = normal.inverse_cdf(0.5 + options.interval_width / 2.0);

        let mut model = Self {
            origin,
            span_days,
            y_scale,
            changepoints,
            intercept: coeffs[0],
            slope: coeffs[1],
            deltas: coeffs[2..].to_vec(),
            sigma: 0.0,
            step: 1.0 / (n - 1) as f64,
            z,
        };

        let sse: f64 = t
            .iter()
            .zip(y.iter())
            .map(|(ti, yi)| (yi - model.trend_at(*ti)).powi(2))
            .sum();
        model.sigma = (sse / n as f64).sqrt();

        tracing::debug!(
            observations = n,
            changepoints = model.changepoints.len(),
            slope = model.slope * model.y_scale,
            "fitted trend model"
        );

        Ok(model)
    }

    fn to_t(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64 / self.span_days
    }

    /// Trend value on the scaled axes.
    fn trend_at(&self, t: f64) -> f64 {
        let hinge: f64 = self
            .changepoints
            .iter()
            .zip(self.deltas.iter())
            .map(|(s, d)| d * (t - s).max(0.0))
            .sum();
        self.intercept + self.slope * t + hinge
    }

    /// Predict every date, historical or future.
    ///
    /// Intervals widen with the square root of the number of periods past
    /// the end of the history.
    pub fn predict(&self, dates: &[NaiveDate]) -> Vec<TrendPoint> {
        dates
            .iter()
            .map(|&date| {
                let t = self.to_t(date);
                let ahead = ((t - 1.0) / self.step).max(0.0);
                let spread = self.z * self.sigma * (1.0 + ahead).sqrt();
                let yhat = self.trend_at(t);
                TrendPoint {
                    date,
                    yhat: yhat * self.y_scale,
                    yhat_lower: (yhat - spread) * self.y_scale,
                    yhat_upper: (yhat + spread) * self.y_scale,
                }
            })
            .collect()
    }

    /// Number of changepoints the trend was allowed to bend at.
    pub fn n_changepoints(&self) -> usize {
        self.changepoints.len()
    }
}

/// Design matrix column `j` at time `t`: constant, time, then one hinge per
/// changepoint.
fn design_value(t: f64, changepoints: &[f64], j: usize) -> f64 {
    match j {
        0 => 1.0,
        1 => t,
        _ => (t - changepoints[j - 2]).max(0.0),
    }
}

/// Changepoints sit on observed times, evenly spread by index over the first
/// `changepoint_range` share of the history.
fn place_changepoints(t: &[f64], options: &TrendOptions) -> Vec<f64> {
    let hist_size = (t.len() as f64 * options.changepoint_range).floor() as usize;
    let k = options.n_changepoints.min(hist_size.saturating_sub(1));
    if k == 0 {
        return Vec::new();
    }
    let last = (hist_size - 1) as f64;
    (1..=k)
        .map(|i| {
            let idx = round_half_even(i as f64 * last / k as f64) as usize;
            t[idx.min(t.len() - 1)]
        })
        .collect()
}

fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

/// History followed by `periods` dates, each twelve months after the last.
pub fn extend_yearly(history: &[NaiveDate], periods: usize) -> Result<Vec<NaiveDate>> {
    let mut current = *history
        .last()
        .ok_or(ForecastError::InsufficientData { needed: 1, got: 0 })?;
    let mut dates = history.to_vec();
    for _ in 0..periods {
        current = current
            .checked_add_months(Months::new(12))
            .ok_or_else(|| ForecastError::ComputationError(format!("Date overflow after {}", current)))?;
        dates.push(current);
    }
    Ok(dates)
}
