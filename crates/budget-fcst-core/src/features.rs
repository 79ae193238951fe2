//! Feature rows and their extrapolation beyond the observed years.

/// Number of feature columns fed to the regressor.
pub const N_FEATURES: usize = 4;

/// One observation of the regressor inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub year: i32,
    pub budget: f64,
    pub population: f64,
    pub growth: f64,
}

impl FeatureRow {
    /// Model input vector, in column order (year, budget, population, growth).
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [self.year as f64, self.budget, self.population, self.growth]
    }
}

/// Per-step growth applied when projecting budget and population.
///
/// Growth is simple, not compounded: step `k` multiplies the last observed
/// value by `1 + rate * k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthAssumptions {
    pub budget_rate: f64,
    pub population_rate: f64,
}

impl Default for GrowthAssumptions {
    fn default() -> Self {
        Self {
            budget_rate: 0.05,
            population_rate: 0.015,
        }
    }
}

/// Build `horizon` synthetic rows following `last`.
///
/// The growth rate is held at its last observed value.
pub fn extrapolate(last: &FeatureRow, horizon: usize, growth: &GrowthAssumptions) -> Vec<FeatureRow> {
    (1..=horizon)
        .map(|k| {
            let step = k as f64;
            FeatureRow {
                year: last.year + k as i32,
                budget: last.budget * (1.0 + growth.budget_rate * step),
                population: last.population * (1.0 + growth.population_rate * step),
                growth: last.growth,
            }
        })
        .collect()
}
