//! FlowSOM clustering pipeline for flow-cytometry marker tables.
//!
//! This crate provides tools for:
//! - Selecting sample tables by file-name keyword
//! - Training a self-organizing map on each sample (parallelized BMU search)
//! - Consensus meta-clustering of the SOM nodes to pick the number of clusters
//! - Rendering the minimum spanning tree of the clustered grid
//! - Writing raw and transformed tables with a cluster label column
//!
//! # Example
//!
//! ```no_run
//! use flowsom_pipeline::{processors::run_pipeline, FlowSom, PipelineConfig};
//!
//! let config = PipelineConfig::from_yaml("flowsom.yaml").unwrap();
//! let reports = run_pipeline(&FlowSom::new(), &config).unwrap();
//! for report in &reports {
//!     println!("{}: k = {}", report.file_name, report.best_k);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{MetaClusteringConfig, PipelineConfig, SomConfig, VisualizationConfig};
pub use core::loaders::SampleTable;
pub use processors::{ClusteringEngine, FlowSom};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
