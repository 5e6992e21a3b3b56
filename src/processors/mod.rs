//! Clustering and orchestration modules.

pub mod consensus;
pub mod engine;
pub mod hierarchical;
pub mod pipeline;
pub mod selection;
pub mod som;

// Re-export key types for convenience
pub use consensus::{ConsensusCluster, ConsensusError, MetaClustering};
pub use engine::{ClusteringEngine, EngineError, FlowSom};
pub use hierarchical::{agglomerative_labels, ClusterError, Dendrogram};
pub use pipeline::{process_file, run_pipeline, run_pipeline_with, FileReport, PipelineError};
pub use selection::{select_files, SelectionError};
pub use som::{SomError, SomGrid, SomTrainer};
