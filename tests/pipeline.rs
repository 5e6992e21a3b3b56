//! End-to-end runs over temporary sample directories.

use std::fs;
use std::path::Path;

use flowsom_pipeline::config::{Initialization, MetaClusteringConfig, SomConfig, VisualizationConfig};
use flowsom_pipeline::processors::consensus::MetaClustering;
use flowsom_pipeline::processors::engine::{ClusteringEngine, EngineError};
use flowsom_pipeline::processors::som::SomGrid;
use flowsom_pipeline::core::LoaderError;
use flowsom_pipeline::processors::{run_pipeline, PipelineError};
use flowsom_pipeline::{FlowSom, PipelineConfig};
use tempfile::TempDir;

/// Assigns row `r` to cluster `r % best_k` without training anything.
struct RoundRobinEngine {
    best_k: usize,
}

impl ClusteringEngine for RoundRobinEngine {
    fn train(&self, data: &[Vec<f64>], _config: &SomConfig) -> Result<SomGrid, EngineError> {
        Ok(SomGrid::zeros(1, self.best_k, data[0].len()))
    }

    fn search_best_k(
        &self,
        _grid: &SomGrid,
        _config: &MetaClusteringConfig,
    ) -> Result<MetaClustering, EngineError> {
        Ok(MetaClustering {
            best_k: self.best_k,
            candidates: vec![self.best_k],
            areas: vec![1.0],
            deltas: vec![],
            node_labels: (0..self.best_k).collect(),
        })
    }

    fn label(
        &self,
        data: &[Vec<f64>],
        _grid: &SomGrid,
        meta: &MetaClustering,
    ) -> Result<Vec<usize>, EngineError> {
        Ok((0..data.len()).map(|r| r % meta.best_k).collect())
    }

    fn visualize(
        &self,
        _grid: &SomGrid,
        _meta: &MetaClustering,
        _config: &VisualizationConfig,
        _path: &Path,
    ) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Two well separated populations over three markers plus a time column.
fn sample_csv(rows: usize, shift: f64) -> String {
    let mut content = String::from("Time,CD45,CD11b,Ly6G\n");
    for r in 0..rows {
        let jitter = ((r as f64) * 1.3).sin() * 0.05;
        let (a, b, c) = if r % 2 == 0 {
            (0.2 + jitter, 0.1 - jitter, 0.3 + jitter)
        } else {
            (0.8 - jitter, 0.9 + jitter, 0.7 - jitter)
        };
        content.push_str(&format!("{},{},{},{}\n", r, a + shift, b + shift, c));
    }
    content
}

fn setup(files: &[(&str, String)]) -> (TempDir, PipelineConfig) {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("normalized_data");
    fs::create_dir(&input).unwrap();
    for (name, content) in files {
        fs::write(input.join(name), content).unwrap();
    }

    let mut config = PipelineConfig::default();
    config.input.dir = input;
    config.input.drop_columns = vec!["Time".to_string()];
    config.output.dir = temp_dir.path().join("clustering_output");
    (temp_dir, config)
}

fn small_flowsom(config: &mut PipelineConfig) {
    config.som = SomConfig {
        x_dim: 5,
        y_dim: 5,
        sigma: 1.5,
        learning_rate: 0.5,
        iterations: 300,
        initialization: Initialization::Pca,
        ..SomConfig::default()
    };
    config.meta = MetaClusteringConfig {
        min_k: 2,
        max_k: 5,
        iterations: 2,
        resample_proportion: 0.8,
        ..MetaClusteringConfig::default()
    };
    config.visualization.width = 300;
    config.visualization.height = 300;
    config.visualization.node_factor = 2;
}

fn read_table(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

#[test]
fn stub_engine_writes_one_label_column_per_row() {
    let (_dir, config) = setup(&[("Mouse1_bm.csv", sample_csv(12, 0.0))]);

    let reports = run_pipeline(&RoundRobinEngine { best_k: 3 }, &config).unwrap();
    assert_eq!(reports.len(), 1);

    let out = &config.output.dir;
    for name in ["flowSOM_clustering_Mouse1_bm.csv", "flowSOM_clustering_tf_Mouse1_bm.csv"] {
        let (header, rows) = read_table(&out.join(name));
        assert_eq!(header, vec!["CD45", "CD11b", "Ly6G", "category"]);
        assert_eq!(rows.len(), 12);
        for (r, row) in rows.iter().enumerate() {
            let label: usize = row[3].parse().unwrap();
            assert_eq!(label, r % 3);
        }
    }
}

#[test]
fn raw_table_keeps_input_cells() {
    let input = "Time,CD45,CD11b\n0,0.10,1e-3\n1,0.5,2\n".to_string();
    let (_dir, config) = setup(&[("Mouse1_bm.csv", input)]);

    run_pipeline(&RoundRobinEngine { best_k: 2 }, &config).unwrap();

    let raw = fs::read_to_string(config.output.dir.join("flowSOM_clustering_Mouse1_bm.csv")).unwrap();
    assert_eq!(raw, "CD45,CD11b,category\n0.10,1e-3,0\n0.5,2,1\n");

    let tf = fs::read_to_string(config.output.dir.join("flowSOM_clustering_tf_Mouse1_bm.csv")).unwrap();
    assert_eq!(tf, "CD45,CD11b,category\n0.1,0.001,0\n0.5,2,1\n");
}

#[test]
fn empty_selection_writes_nothing() {
    let (_dir, config) = setup(&[("Mouse2_bm.csv", sample_csv(4, 0.0))]);

    let reports = run_pipeline(&RoundRobinEngine { best_k: 2 }, &config).unwrap();

    assert!(reports.is_empty());
    assert!(!config.output.dir.exists());
}

#[test]
fn missing_drop_column_stops_the_run() {
    let (_dir, mut config) = setup(&[("Mouse1_bm.csv", sample_csv(4, 0.0))]);
    config.input.drop_columns = vec!["FSC-A".to_string()];

    let err = run_pipeline(&RoundRobinEngine { best_k: 2 }, &config).unwrap_err();
    assert!(matches!(err, PipelineError::File { .. }));
    assert!(err.to_string().contains("Mouse1_bm.csv"));
}

#[test]
fn padded_headers_survive_in_raw_table() {
    let input = " Time,CD45 , CD11b\n0,0.1,2\n1,0.5,3\n".to_string();
    let (_dir, config) = setup(&[("Mouse1_bm.csv", input)]);

    run_pipeline(&RoundRobinEngine { best_k: 2 }, &config).unwrap();

    let raw = fs::read_to_string(config.output.dir.join("flowSOM_clustering_Mouse1_bm.csv")).unwrap();
    assert_eq!(raw, "CD45 , CD11b,category\n0.1,2,0\n0.5,3,1\n");
}

#[test]
fn nan_marker_cell_stops_flowsom_run() {
    let mut input = sample_csv(40, 0.0);
    input.push_str("40,NaN,1,0.5\n");
    let (_dir, mut config) = setup(&[("Mouse1_x.csv", input)]);
    small_flowsom(&mut config);

    let err = run_pipeline(&FlowSom::new(), &config).unwrap_err();
    match err {
        PipelineError::File { file, source } => {
            assert_eq!(file, "Mouse1_x.csv");
            assert!(matches!(
                *source,
                PipelineError::Load(LoaderError::NonFinite { row: 40, .. })
            ));
        }
        other => panic!("Expected File error, got {:?}", other),
    }
    assert!(!config.output.dir.join("flowSOM_clustering_Mouse1_x.csv").exists());
}

#[test]
fn flowsom_labels_every_row_within_best_k() {
    let (_dir, mut config) = setup(&[
        ("Mouse1_bm.csv", sample_csv(80, 0.0)),
        ("Mouse1_spleen.csv", sample_csv(60, 0.5)),
    ]);
    small_flowsom(&mut config);

    let reports = run_pipeline(&FlowSom::new(), &config).unwrap();
    assert_eq!(reports.len(), 2);

    for report in &reports {
        assert!((2..=5).contains(&report.best_k));
        assert!(report.mst_path.exists());

        let (header, rows) = read_table(&report.raw_path);
        assert_eq!(header.last().map(String::as_str), Some("category"));
        assert_eq!(header.len(), 4);
        assert_eq!(rows.len(), report.rows);
        for row in &rows {
            let label: usize = row[3].parse().unwrap();
            assert!(label < report.best_k);
        }
    }

    assert!(config.output.dir.join("Mouse1_spleen_mst.png").exists());
}

#[test]
fn flowsom_rerun_is_byte_identical() {
    let (_dir, mut config) = setup(&[("Mouse1_bm.csv", sample_csv(60, 0.0))]);
    small_flowsom(&mut config);

    let read_outputs = |config: &PipelineConfig| {
        let out = &config.output.dir;
        (
            fs::read(out.join("flowSOM_clustering_Mouse1_bm.csv")).unwrap(),
            fs::read(out.join("flowSOM_clustering_tf_Mouse1_bm.csv")).unwrap(),
        )
    };

    run_pipeline(&FlowSom::new(), &config).unwrap();
    let first = read_outputs(&config);
    run_pipeline(&FlowSom::new(), &config).unwrap();
    let second = read_outputs(&config);

    assert_eq!(first, second);
}
