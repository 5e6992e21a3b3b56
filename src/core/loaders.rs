//! Loader for per-sample marker tables.
//!
//! A sample file is a delimited table with one header row, one row per
//! event and one column per channel. Cells are kept verbatim for the raw
//! output table and parsed into an `f64` matrix for training.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during sample loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Row {row} has {found} fields, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value {value:?} at row {row}, column {column}")]
    ParseError {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Non-finite value {value:?} at row {row}, column {column}")]
    NonFinite {
        row: usize,
        column: String,
        value: String,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// One sample held in memory: verbatim cells, parsed values and, once the
/// pipeline has run, transformed values and cluster labels.
#[derive(Debug, Clone)]
pub struct SampleTable {
    /// File name the sample was loaded from.
    pub name: String,
    /// Kept column names, in file order.
    pub columns: Vec<String>,
    /// Raw cells as read. Shape: [rows][columns].
    pub cells: Vec<Vec<String>>,
    /// Parsed marker values. Shape: [rows][columns].
    pub values: Vec<Vec<f64>>,
    /// Transformed marker values, same shape as `values`.
    pub transformed: Option<Vec<Vec<f64>>>,
    /// Cluster id per row.
    pub labels: Option<Vec<usize>>,
}

impl SampleTable {
    /// Build a table from parsed values, rendering each cell with `Display`.
    pub fn from_values(name: &str, columns: Vec<String>, values: Vec<Vec<f64>>) -> Self {
        let cells = values
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        Self {
            name: name.to_string(),
            columns,
            cells,
            values,
            transformed: None,
            labels: None,
        }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Values the SOM is trained on: transformed if present, raw otherwise.
    pub fn training_values(&self) -> &[Vec<f64>] {
        self.transformed.as_deref().unwrap_or(&self.values)
    }
}

/// Load a sample table, dropping the named non-marker columns first.
///
/// Columns listed in `drop_columns` are never parsed, so they may hold
/// non-numeric data such as event ids or sample tags. Every remaining cell
/// must parse as a finite floating-point number.
///
/// Header names are kept as written so the raw output repeats them. Drop
/// names are compared against the trimmed header.
///
/// # Arguments
///
/// * `path` - Path to the delimited file
/// * `drop_columns` - Column names to remove (empty for none)
/// * `delimiter` - Field delimiter, usually `,`
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no data rows, names a
/// drop column that does not exist, or contains a non-numeric, NaN or
/// infinite marker cell.
pub fn load_sample<P: AsRef<Path>>(
    path: P,
    drop_columns: &[String],
    delimiter: u8,
) -> Result<SampleTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    if headers.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let is_dropped = |header: &str| drop_columns.iter().any(|name| name.trim() == header.trim());

    let missing: Vec<&str> = drop_columns
        .iter()
        .filter(|name| !headers.iter().any(|h| h.trim() == name.trim()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let keep: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_dropped(name))
        .map(|(i, _)| i)
        .collect();
    let columns: Vec<String> = keep.iter().map(|&i| headers[i].clone()).collect();

    let mut cells = Vec::with_capacity(4096);
    let mut values = Vec::with_capacity(4096);

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() != headers.len() {
            return Err(LoaderError::RaggedRow {
                row: row_idx,
                expected: headers.len(),
                found: record.len(),
            });
        }

        let mut cell_row = Vec::with_capacity(keep.len());
        let mut value_row = Vec::with_capacity(keep.len());
        for &col in &keep {
            let raw = &record[col];
            let value: f64 = raw.trim().parse().map_err(|_| LoaderError::ParseError {
                row: row_idx,
                column: headers[col].clone(),
                value: raw.to_string(),
            })?;
            if !value.is_finite() {
                return Err(LoaderError::NonFinite {
                    row: row_idx,
                    column: headers[col].clone(),
                    value: raw.to_string(),
                });
            }
            cell_row.push(raw.to_string());
            value_row.push(value);
        }

        cells.push(cell_row);
        values.push(value_row);
    }

    if values.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(SampleTable {
        name,
        columns,
        cells,
        values,
        transformed: None,
        labels: None,
    })
}
