//! Accuracy metrics for the held-out part of a regional series.

use crate::error::{ForecastError, Result};

/// Mean absolute error of predictions over held-out years.
///
/// ```
/// use budget_fcst_core::metrics::mae;
/// // Two held-out years of expenditure, each missed by 10.
/// let observed = [1200.0, 1250.0];
/// let predicted = [1190.0, 1260.0];
/// assert_eq!(mae(&observed, &predicted).unwrap(), 10.0);
/// ```
pub fn mae(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    let n = check_pair(observed, predicted)?;
    Ok(residuals(observed, predicted).map(f64::abs).sum::<f64>() / n)
}

/// Mean squared error.
pub fn mse(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    let n = check_pair(observed, predicted)?;
    Ok(residuals(observed, predicted).map(|r| r * r).sum::<f64>() / n)
}

/// Root mean squared error, in the unit of the target.
pub fn rmse(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    mse(observed, predicted).map(f64::sqrt)
}

/// Coefficient of determination.
///
/// NaN when the observed values do not vary, as with a single held-out year.
pub fn r2(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    let n = check_pair(observed, predicted)?;
    let centre = observed.iter().sum::<f64>() / n;
    let total: f64 = observed.iter().map(|v| (v - centre).powi(2)).sum();
    if total < f64::EPSILON {
        return Ok(f64::NAN);
    }
    let unexplained: f64 = residuals(observed, predicted).map(|r| r * r).sum();
    Ok(1.0 - unexplained / total)
}

/// Score of a model on the chronologically last observations it never saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldoutScore {
    pub n_test: usize,
    pub mae: f64,
    pub rmse: f64,
    /// `None` when R² is undefined.
    pub r2: Option<f64>,
}

impl HoldoutScore {
    pub fn compute(observed: &[f64], predicted: &[f64]) -> Result<Self> {
        let r2 = r2(observed, predicted)?;
        Ok(Self {
            n_test: observed.len(),
            mae: mae(observed, predicted)?,
            rmse: rmse(observed, predicted)?,
            r2: (!r2.is_nan()).then_some(r2),
        })
    }
}

fn residuals<'a>(observed: &'a [f64], predicted: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
    observed.iter().zip(predicted).map(|(o, p)| o - p)
}

/// Length of a non-empty pair of equally long series, as `f64`.
fn check_pair(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    if observed.len() != predicted.len() {
        return Err(ForecastError::InvalidInput(format!(
            "{} held-out values but {} predictions",
            observed.len(),
            predicted.len()
        )));
    }
    if observed.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(observed.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mae() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let forecast = vec![1.1, 2.2, 2.9, 4.1, 4.8];
        let result = mae(&actual, &forecast).unwrap();
        assert_relative_eq!(result, 0.14, epsilon = 0.01);
    }

    #[test]
    fn test_rmse() {
        let actual = vec![0.0, 0.0];
        let forecast = vec![3.0, 4.0];
        assert_relative_eq!(rmse(&actual, &forecast).unwrap(), 12.5f64.sqrt());
    }

    #[test]
    fn test_r2_perfect_and_constant() {
        let actual = vec![1.0, 2.0, 3.0];
        assert_relative_eq!(r2(&actual, &actual).unwrap(), 1.0);
        assert!(r2(&[5.0], &[4.0]).unwrap().is_nan());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            mae(&[1.0, 2.0], &[1.0]),
            Err(ForecastError::InvalidInput(_))
        ));
        assert!(matches!(
            mse(&[], &[]),
            Err(ForecastError::InsufficientData { needed: 1, got: 0 })
        ));
    }

    #[test]
    fn test_holdout_score_single_point() {
        let score = HoldoutScore::compute(&[10.0], &[12.0]).unwrap();
        assert_eq!(score.n_test, 1);
        assert_relative_eq!(score.mae, 2.0);
        assert_relative_eq!(score.rmse, 2.0);
        assert_eq!(score.r2, None);
    }
}
