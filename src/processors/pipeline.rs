//! Per-file FlowSOM orchestration.
//!
//! For each selected sample: load → transform → train → search best k →
//! draw MST → label → write both tables. Files are processed one at a time
//! in sorted order and the first failure stops the run.

use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::{load_sample, LoaderError};
use crate::core::transforms::{apply_transform, TransformError};
use crate::core::writers::{
    mst_file_name, output_file_names, write_labeled_csv, TableVariant, WriteError, WriteOptions,
};
use super::engine::{ClusteringEngine, EngineError};
use super::selection::{select_files, SelectionError};

/// Errors that stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("delimiter {0:?} is not a single-byte character")]
    InvalidDelimiter(char),

    #[error("{file}: {source}")]
    File {
        file: String,
        #[source]
        source: Box<PipelineError>,
    },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// What was produced for one sample.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_name: String,
    pub rows: usize,
    pub columns: usize,
    pub best_k: usize,
    /// Rows per meta-cluster, indexed by label.
    pub cluster_sizes: Vec<usize>,
    pub raw_path: PathBuf,
    pub transformed_path: PathBuf,
    pub mst_path: PathBuf,
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(PipelineError::InvalidDelimiter(c))
}

/// Run every step for a single sample file.
///
/// # Arguments
///
/// * `engine` - Clustering capability
/// * `file_name` - Bare file name inside `config.input.dir`
/// * `config` - Full pipeline configuration
///
/// # Errors
///
/// Returns the first error from loading, transforming, clustering,
/// drawing or writing.
pub fn process_file<E>(engine: &E, file_name: &str, config: &PipelineConfig) -> Result<FileReport>
where
    E: ClusteringEngine + ?Sized,
{
    let delimiter = delimiter_byte(config.input.delimiter)?;
    let input_path = config.input.dir.join(file_name);

    let mut table = load_sample(&input_path, &config.input.drop_columns, delimiter)?;
    info!(
        "{}: {} rows x {} markers",
        file_name,
        table.num_rows(),
        table.num_columns()
    );

    apply_transform(&mut table, &config.transform)?;

    let grid = engine.train(table.training_values(), &config.som)?;
    let meta = engine.search_best_k(&grid, &config.meta)?;

    let out_dir = &config.output.dir;
    fs::create_dir_all(out_dir).map_err(|source| PipelineError::OutputDir {
        path: out_dir.clone(),
        source,
    })?;

    let mst_path = out_dir.join(mst_file_name(file_name));
    engine.visualize(&grid, &meta, &config.visualization, &mst_path)?;

    let labels = engine.label(table.training_values(), &grid, &meta)?;
    let mut cluster_sizes = vec![0usize; meta.best_k];
    for &label in &labels {
        if let Some(count) = cluster_sizes.get_mut(label) {
            *count += 1;
        }
    }
    table.labels = Some(labels);

    let opts = WriteOptions {
        label_column: config.output.label_column.clone(),
        write_index: config.output.write_index,
    };
    let (raw_name, tf_name) = output_file_names(file_name);
    let raw_path = out_dir.join(raw_name);
    let transformed_path = out_dir.join(tf_name);

    write_labeled_csv(&raw_path, &table, TableVariant::Raw, &opts)?;
    write_labeled_csv(&transformed_path, &table, TableVariant::Transformed, &opts)?;
    info!("Wrote {} and {}", raw_path.display(), transformed_path.display());

    Ok(FileReport {
        file_name: file_name.to_string(),
        rows: table.num_rows(),
        columns: table.num_columns(),
        best_k: meta.best_k,
        cluster_sizes,
        raw_path,
        transformed_path,
        mst_path,
    })
}

/// Select and process every matching file, reporting progress.
///
/// `on_file` is called with `(position, total, file_name)` before each file
/// is processed.
pub fn run_pipeline_with<E, F>(
    engine: &E,
    config: &PipelineConfig,
    mut on_file: F,
) -> Result<Vec<FileReport>>
where
    E: ClusteringEngine + ?Sized,
    F: FnMut(usize, usize, &str),
{
    let files = select_files(&config.input.dir, &config.input.keyword, config.input.match_mode)?;
    if files.is_empty() {
        warn!(
            "No files in {} match {:?}",
            config.input.dir.display(),
            config.input.keyword
        );
        return Ok(Vec::new());
    }
    info!("Selected {} files", files.len());

    let mut reports = Vec::with_capacity(files.len());
    for (idx, file_name) in files.iter().enumerate() {
        on_file(idx, files.len(), file_name);
        let report = process_file(engine, file_name, config).map_err(|e| PipelineError::File {
            file: file_name.clone(),
            source: Box::new(e),
        })?;
        reports.push(report);
    }

    Ok(reports)
}

/// Select and process every matching file.
pub fn run_pipeline<E>(engine: &E, config: &PipelineConfig) -> Result<Vec<FileReport>>
where
    E: ClusteringEngine + ?Sized,
{
    run_pipeline_with(engine, config, |_, _, _| {})
}
