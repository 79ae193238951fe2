//! Mapping between logical fields and the column headers of the input sheet.
//!
//! The defaults are the localized headers of the national health-budget
//! workbook. A JSON file can override any subset of them:
//!
//! ```
//! use budget_fcst_core::columns::ColumnMap;
//! let map: ColumnMap = serde_json::from_str(r#"{"region": "Region"}"#).unwrap();
//! assert_eq!(map.region, "Region");
//! assert_eq!(map.year, "Année");
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Header names of the input columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMap {
    pub region: String,
    pub year: String,
    pub budget: String,
    pub population: String,
    pub growth: String,
    pub expenditure: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            region: "Région".to_string(),
            year: "Année".to_string(),
            budget: "Budget_Santé".to_string(),
            population: "Population".to_string(),
            growth: "Croissance".to_string(),
            expenditure: "Dépenses_Santé".to_string(),
        }
    }
}

impl ColumnMap {
    /// Load a mapping override from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ForecastError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| ForecastError::InvalidParameter {
            param: "columns".into(),
            value: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Columns every regional training frame needs, in the reference order.
    pub fn regional_required(&self) -> [&str; 5] {
        [
            self.year.as_str(),
            self.budget.as_str(),
            self.population.as_str(),
            self.growth.as_str(),
            self.expenditure.as_str(),
        ]
    }

    /// Feature columns, in model input order.
    pub fn features(&self) -> [&str; 4] {
        [
            self.year.as_str(),
            self.budget.as_str(),
            self.population.as_str(),
            self.growth.as_str(),
        ]
    }
}
