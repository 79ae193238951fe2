//! Loading of the input sheet into an untyped table.
//!
//! The forecasters only ever need a handful of named columns, so the table
//! keeps cells loosely typed and coerces them on access, reporting the row and
//! column of any value that does not fit.

use std::fs::File;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{ForecastError, Result};

/// A single loosely typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Parse a textual cell, recognising numbers.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else if let Ok(v) = trimmed.parse::<f64>() {
            Cell::Number(v)
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    fn from_sheet(data: &Data) -> Self {
        match data {
            Data::Float(v) => Cell::Number(*v),
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Data::String(s) => Cell::parse(s),
            Data::Empty => Cell::Empty,
            other => Cell::Text(other.to_string()),
        }
    }

    /// Render the cell as a grouping key. Integral numbers drop the fraction.
    pub fn label(&self) -> String {
        match self {
            Cell::Number(v) if v.fract() == 0.0 && v.is_finite() => format!("{}", *v as i64),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Empty => String::new(),
        }
    }
}

/// Supported input file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Delimited text with the given delimiter.
    Delimited(u8),
    /// Workbook read through calamine (first worksheet).
    Workbook,
}

impl InputFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(InputFormat::Delimited(b',')),
            "tsv" | "tab" => Ok(InputFormat::Delimited(b'\t')),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Workbook),
            _ => Err(ForecastError::UnsupportedFormat(format!(
                "{} (expected .csv, .tsv, .xlsx, .xls or .ods)",
                path.display()
            ))),
        }
    }
}

/// Header plus rows of loosely typed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from a header and rows; short rows are padded.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width.max(row.len()), Cell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Load a table from disk, choosing the reader by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let format = InputFormat::from_path(path)?;
        let table = match format {
            InputFormat::Delimited(delimiter) => Self::load_delimited(path, delimiter)?,
            InputFormat::Workbook => Self::load_workbook(path)?,
        };
        tracing::debug!(
            path = %path.display(),
            columns = table.columns.len(),
            rows = table.rows.len(),
            "loaded input table"
        );
        Ok(table)
    }

    fn load_delimited(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).map_err(|source| io_error(path, source))?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(Cell::parse).collect());
        }

        Ok(Self::new(columns, rows))
    }

    fn load_workbook(path: &Path) -> Result<Self> {
        // Surface a missing file as an I/O error rather than a workbook error.
        File::open(path).map_err(|source| io_error(path, source))?;

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| ForecastError::Spreadsheet(format!("{}: {}", path.display(), e)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                ForecastError::Spreadsheet(format!("{}: workbook has no sheets", path.display()))
            })?
            .map_err(|e| ForecastError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

        let mut sheet_rows = range.rows();
        let columns: Vec<String> = match sheet_rows.next() {
            Some(header) => header
                .iter()
                .map(|c| Cell::from_sheet(c).label())
                .collect(),
            None => Vec::new(),
        };

        let rows = sheet_rows
            .map(|row| row.iter().map(Cell::from_sheet).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|c| *c != Cell::Empty))
            .collect();

        Ok(Self::new(columns, rows))
    }

    /// Number of data rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column by exact header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Resolve every requested column, or fail naming all the absent ones.
    pub fn require(&self, names: &[&str], region: Option<&str>) -> Result<Vec<usize>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| self.column_index(n).is_none())
            .map(|n| n.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::MissingColumns {
                region: region.map(str::to_string),
                columns: missing,
            });
        }
        Ok(names
            .iter()
            .filter_map(|n| self.column_index(n))
            .collect())
    }

    /// Raw cell access.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    /// Cell coerced to an integer year. Fractional years are truncated.
    pub fn year(&self, row: usize, col: usize) -> Result<i32> {
        match self.cell(row, col) {
            Cell::Number(v) if v.is_finite() && v.abs() < i32::MAX as f64 => Ok(v.trunc() as i32),
            Cell::Text(s) => s.parse::<i32>().map_err(|_| self.bad_value(row, col, "an integer year")),
            _ => Err(self.bad_value(row, col, "an integer year")),
        }
    }

    /// Cell coerced to a finite number.
    pub fn number(&self, row: usize, col: usize) -> Result<f64> {
        match self.cell(row, col) {
            Cell::Number(v) if v.is_finite() => Ok(*v),
            _ => Err(self.bad_value(row, col, "a finite number")),
        }
    }

    /// Cell rendered as a grouping key. Blank cells have no key.
    pub fn label(&self, row: usize, col: usize) -> Result<String> {
        match self.cell(row, col) {
            Cell::Empty => Err(self.bad_value(row, col, "a region label")),
            cell => Ok(cell.label()),
        }
    }

    fn bad_value(&self, row: usize, col: usize, expected: &str) -> ForecastError {
        ForecastError::InvalidInput(format!(
            "row {} column '{}': expected {}, found {:?}",
            row + 2,
            self.columns[col],
            expected,
            self.cell(row, col)
        ))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ForecastError {
    ForecastError::Io {
        path: PathBuf::from(path),
        source,
    }
}
