//! The clustering capability used by the pipeline.
//!
//! `ClusteringEngine` bundles the four steps the pipeline needs from a
//! FlowSOM implementation. `FlowSom` is the production engine built from the
//! SOM trainer, the consensus search and the MST renderer; tests substitute
//! a deterministic stub.

use std::path::Path;

use thiserror::Error;

use crate::config::{MetaClusteringConfig, SomConfig, VisualizationConfig};
use crate::visualization::{self, VisualizationError};
use super::consensus::{ConsensusCluster, ConsensusError, MetaClustering};
use super::som::{SomError, SomGrid, SomTrainer};

/// Errors raised by a clustering engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid training input: {0}")]
    InvalidInput(#[from] SomError),

    #[error("meta-clustering failed: {0}")]
    InvalidRange(#[from] ConsensusError),

    #[error("{labels} node labels for a grid of {nodes} nodes")]
    LabelMismatch { nodes: usize, labels: usize },

    #[error("row {row} has {found} values, grid expects {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("visualization failed: {0}")]
    Visualization(#[from] VisualizationError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Train, meta-cluster, label and draw one sample.
pub trait ClusteringEngine {
    /// Train a SOM grid on the rows of `data`.
    fn train(&self, data: &[Vec<f64>], config: &SomConfig) -> Result<SomGrid>;

    /// Choose the number of meta-clusters and map every node to one.
    fn search_best_k(&self, grid: &SomGrid, config: &MetaClusteringConfig) -> Result<MetaClustering>;

    /// Meta-cluster id of every row, via its best matching node.
    fn label(&self, data: &[Vec<f64>], grid: &SomGrid, meta: &MetaClustering) -> Result<Vec<usize>>;

    /// Render the minimum spanning tree of the grid to `path`.
    fn visualize(
        &self,
        grid: &SomGrid,
        meta: &MetaClustering,
        config: &VisualizationConfig,
        path: &Path,
    ) -> Result<()>;
}

/// FlowSOM: SOM training followed by consensus meta-clustering.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowSom;

impl FlowSom {
    pub fn new() -> Self {
        Self
    }
}

impl ClusteringEngine for FlowSom {
    fn train(&self, data: &[Vec<f64>], config: &SomConfig) -> Result<SomGrid> {
        Ok(SomTrainer::new(config.clone()).train(data)?)
    }

    fn search_best_k(&self, grid: &SomGrid, config: &MetaClusteringConfig) -> Result<MetaClustering> {
        let meta = ConsensusCluster::new(config.clone()).fit(&grid.weights)?;
        log::info!(
            "Best k = {} (candidates {}..={})",
            meta.best_k,
            config.min_k,
            config.max_k
        );
        Ok(meta)
    }

    fn label(&self, data: &[Vec<f64>], grid: &SomGrid, meta: &MetaClustering) -> Result<Vec<usize>> {
        if meta.node_labels.len() != grid.num_nodes() {
            return Err(EngineError::LabelMismatch {
                nodes: grid.num_nodes(),
                labels: meta.node_labels.len(),
            });
        }
        if let Some((row, r)) = data.iter().enumerate().find(|(_, r)| r.len() != grid.dim) {
            return Err(EngineError::RowWidth {
                row,
                expected: grid.dim,
                found: r.len(),
            });
        }

        Ok(grid
            .winners(data)
            .into_iter()
            .map(|winner| meta.node_labels[winner])
            .collect())
    }

    fn visualize(
        &self,
        grid: &SomGrid,
        meta: &MetaClustering,
        config: &VisualizationConfig,
        path: &Path,
    ) -> Result<()> {
        visualization::render_mst(path, grid, &meta.node_labels, meta.best_k, config)?;
        Ok(())
    }
}
