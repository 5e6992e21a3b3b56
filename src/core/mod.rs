//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{load_sample, LoaderError, SampleTable};
pub use transforms::{apply_transform, TransformError};
pub use writers::{mst_file_name, output_file_names, write_labeled_csv, TableVariant, WriteError, WriteOptions};
