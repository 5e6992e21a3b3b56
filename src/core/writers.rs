//! Writers for labeled sample tables.
//!
//! Each processed sample produces two CSV tables side by side:
//! - `flowSOM_clustering_<file>`: the raw cells with the cluster label appended
//! - `flowSOM_clustering_tf_<file>`: the transformed values with the label appended
//!
//! Files are written in place through a buffered writer; a failure part way
//! through can leave a truncated table behind.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::loaders::SampleTable;

/// Prefix of the raw labeled table.
pub const RAW_PREFIX: &str = "flowSOM_clustering_";

/// Prefix of the transformed labeled table.
pub const TRANSFORMED_PREFIX: &str = "flowSOM_clustering_tf_";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Labels do not cover every row.
    #[error("array length mismatch: table has {rows_len} rows, labels has {labels_len} elements")]
    LengthMismatch { rows_len: usize, labels_len: usize },

    /// The requested variant has no data.
    #[error("table '{0}' has no transformed values")]
    MissingTransformed(String),
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Which copy of the marker values a table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableVariant {
    /// Cells exactly as they were read.
    Raw,
    /// Transformed values, formatted with `f64`'s shortest round-trip form.
    Transformed,
}

/// Column layout options shared by both variants.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub label_column: String,
    /// Prepend an unnamed 0-based row index column.
    pub write_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            label_column: "category".to_string(),
            write_index: false,
        }
    }
}

/// Output table names for an input file: `(raw, transformed)`.
///
/// ```
/// use flowsom_pipeline::core::writers::output_file_names;
///
/// let (raw, tf) = output_file_names("Mouse1_spleen.csv");
/// assert_eq!(raw, "flowSOM_clustering_Mouse1_spleen.csv");
/// assert_eq!(tf, "flowSOM_clustering_tf_Mouse1_spleen.csv");
/// ```
pub fn output_file_names(input_name: &str) -> (String, String) {
    (
        format!("{}{}", RAW_PREFIX, input_name),
        format!("{}{}", TRANSFORMED_PREFIX, input_name),
    )
}

/// Sample name used for the MST image: the file name without a `.csv` suffix.
pub fn sample_stem(input_name: &str) -> &str {
    input_name.strip_suffix(".csv").unwrap_or(input_name)
}

/// MST image name for an input file.
pub fn mst_file_name(input_name: &str) -> String {
    format!("{}_mst.png", sample_stem(input_name))
}

/// Write a labeled sample table to CSV.
///
/// The header is the kept marker columns followed by `opts.label_column`
/// (and preceded by an empty index header when `opts.write_index` is set).
/// One row is written per event.
///
/// # Arguments
///
/// * `path` - Output file path inside an existing directory
/// * `table` - Sample with labels assigned
/// * `variant` - Raw cells or transformed values
/// * `opts` - Label column name and index layout
///
/// # Errors
///
/// Returns an error if:
/// - the table carries no labels, or fewer/more labels than rows
/// - the transformed variant is requested but the table has none
/// - the file cannot be created or written to
pub fn write_labeled_csv(
    path: &Path,
    table: &SampleTable,
    variant: TableVariant,
    opts: &WriteOptions,
) -> Result<()> {
    let labels = table.labels.as_deref().unwrap_or(&[]);
    if labels.len() != table.num_rows() {
        return Err(WriteError::LengthMismatch {
            rows_len: table.num_rows(),
            labels_len: labels.len(),
        });
    }

    let transformed = match variant {
        TableVariant::Raw => None,
        TableVariant::Transformed => Some(
            table
                .transformed
                .as_ref()
                .ok_or_else(|| WriteError::MissingTransformed(table.name.clone()))?,
        ),
    };

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let buf_writer = BufWriter::new(file);
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();

    // Write header
    let mut header: Vec<&str> = Vec::with_capacity(table.num_columns() + 2);
    if opts.write_index {
        header.push("");
    }
    header.extend(table.columns.iter().map(String::as_str));
    header.push(&opts.label_column);
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    // Write data rows
    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for (row_idx, label) in labels.iter().enumerate() {
        record.clear();
        if opts.write_index {
            record.push(row_idx.to_string());
        }
        match transformed {
            Some(values) => record.extend(values[row_idx].iter().map(|v| v.to_string())),
            None => record.extend(table.cells[row_idx].iter().cloned()),
        }
        record.push(label.to_string());

        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn labeled_table() -> SampleTable {
        let mut table = SampleTable::from_values(
            "Mouse1_bm.csv",
            vec!["CD45".into(), "CD11b".into()],
            vec![vec![0.5, 1.0], vec![2.0, 3.5], vec![4.0, 0.25]],
        );
        table.cells[0][0] = "0.50".to_string();
        table.transformed = Some(vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]]);
        table.labels = Some(vec![0, 2, 1]);
        table
    }

    #[test]
    fn test_output_file_names() {
        let (raw, tf) = output_file_names("Mouse1_Tube_003.csv");
        assert_eq!(raw, "flowSOM_clustering_Mouse1_Tube_003.csv");
        assert_eq!(tf, "flowSOM_clustering_tf_Mouse1_Tube_003.csv");
    }

    #[test]
    fn test_mst_file_name() {
        assert_eq!(mst_file_name("Mouse1_Tube_003.csv"), "Mouse1_Tube_003_mst.png");
        assert_eq!(mst_file_name("Mouse1.txt"), "Mouse1.txt_mst.png");
    }

    #[test]
    fn test_write_raw_keeps_cells_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");

        write_labeled_csv(&path, &labeled_table(), TableVariant::Raw, &WriteOptions::default())
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["CD45,CD11b,category", "0.50,1,0", "2,3.5,2", "4,0.25,1"]);
    }

    #[test]
    fn test_write_transformed_with_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tf.csv");
        let opts = WriteOptions {
            label_column: "cluster".to_string(),
            write_index: true,
        };

        write_labeled_csv(&path, &labeled_table(), TableVariant::Transformed, &opts).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], ",CD45,CD11b,cluster");
        assert_eq!(lines[1], "0,0.1,0.2,0");
        assert_eq!(lines[3], "2,0.5,0.6,1");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_write_labels_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut table = labeled_table();
        table.labels = Some(vec![0]);

        match write_labeled_csv(&path, &table, TableVariant::Raw, &WriteOptions::default()) {
            Err(WriteError::LengthMismatch {
                rows_len,
                labels_len,
            }) => {
                assert_eq!(rows_len, 3);
                assert_eq!(labels_len, 1);
            }
            other => panic!("Expected LengthMismatch error, got {:?}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_write_into_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("raw.csv");

        let result = write_labeled_csv(&path, &labeled_table(), TableVariant::Raw, &WriteOptions::default());
        assert!(matches!(result, Err(WriteError::CreateFile { .. })));
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_write_transformed_requires_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tf.csv");
        let mut table = labeled_table();
        table.transformed = None;

        let result = write_labeled_csv(&path, &table, TableVariant::Transformed, &WriteOptions::default());
        assert!(matches!(result, Err(WriteError::MissingTransformed(_))));
    }
}
