//! Error types for the budget forecasters.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types for forecast operations.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("{}", missing_columns_message(.region.as_deref(), .columns))]
    MissingColumns {
        region: Option<String>,
        columns: Vec<String>,
    },

    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV input")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),
}

fn missing_columns_message(region: Option<&str>, columns: &[String]) -> String {
    match region {
        Some(r) => format!("Missing columns for region {}: {:?}", r, columns),
        None => format!("Missing columns: {:?}", columns),
    }
}

impl ForecastError {
    /// Short machine-friendly name of the variant, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InvalidInput(_) => "invalid_input",
            ForecastError::ComputationError(_) => "computation",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::InvalidParameter { .. } => "invalid_parameter",
            ForecastError::MissingColumns { .. } => "missing_columns",
            ForecastError::Io { .. } => "io",
            ForecastError::Csv(_) => "csv",
            ForecastError::Spreadsheet(_) => "spreadsheet",
            ForecastError::UnsupportedFormat(_) => "unsupported_format",
        }
    }

    /// Errors confined to the rows of a single region.
    ///
    /// Structural problems (missing header columns, unreadable input) are
    /// never region-local.
    pub fn is_region_local(&self) -> bool {
        matches!(
            self,
            ForecastError::InvalidInput(_)
                | ForecastError::InsufficientData { .. }
                | ForecastError::ComputationError(_)
        )
    }
}
