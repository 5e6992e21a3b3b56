//! Configuration types for the FlowSOM pipeline.
//!
//! Every field has a serde default, so a YAML file only needs to name the
//! values it overrides. `PipelineConfig::default()` reproduces the myeloid
//! composition experiment the tool was written for.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the file selector compares file names against the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-sensitive substring containment.
    #[default]
    Substring,
    /// Keyword is a regular expression searched anywhere in the name.
    Regex,
}

/// Where samples are read from and which of them are processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory containing the normalized per-sample tables
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,

    /// File names must contain this keyword to be processed
    #[serde(default = "default_keyword")]
    pub keyword: String,

    #[serde(default)]
    pub match_mode: MatchMode,

    /// Non-marker columns removed before training
    #[serde(default)]
    pub drop_columns: Vec<String>,

    /// Field delimiter of the input tables
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(
        "/stor/work/Ehrlich/T-ALL/myeloid/data/MyeloidComposition_Myeloid/csvs_from_fcs/normalized_data",
    )
}

fn default_keyword() -> String {
    "Mouse1".to_string()
}

fn default_delimiter() -> char {
    ','
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            keyword: default_keyword(),
            match_mode: MatchMode::default(),
            drop_columns: Vec::new(),
            delimiter: default_delimiter(),
        }
    }
}

/// Where and how labeled tables are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory for tables and MST images
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Name of the appended cluster-label column
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Write a leading unnamed row-index column (pandas `to_csv` layout)
    #[serde(default)]
    pub write_index: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/stor/work/Ehrlich/T-ALL/myeloid/data/MyeloidComposition_Myeloid/clustering_output/")
}

fn default_label_column() -> String {
    "category".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            label_column: default_label_column(),
            write_index: false,
        }
    }
}

/// Transform applied to marker values before training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    /// Inputs are already normalized; the transformed table equals the raw one.
    #[default]
    None,
    /// `asinh(x / cofactor)`
    Arcsinh { cofactor: f64 },
    /// `log10(x)`; every value must be positive.
    Log,
}

/// Neighborhood function used during SOM updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    #[default]
    Gaussian,
    MexicanHat,
    Bubble,
    Triangle,
}

/// Initial placement of SOM weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    /// Spread over the plane of the first two principal components.
    #[default]
    Pca,
    /// Seeded uniform random unit vectors.
    Random,
}

/// Configuration for SOM training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomConfig {
    /// Grid rows
    #[serde(default = "default_grid_dim")]
    pub x_dim: usize,

    /// Grid columns
    #[serde(default = "default_grid_dim")]
    pub y_dim: usize,

    /// Initial neighborhood spread
    #[serde(default = "default_sigma")]
    pub sigma: f64,

    /// Initial learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Number of single-sample training updates ("batch size" in FlowSOM terms)
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    #[serde(default)]
    pub neighborhood: Neighborhood,

    #[serde(default)]
    pub initialization: Initialization,

    /// Draw training rows at random instead of cycling through them in order
    #[serde(default)]
    pub random_order: bool,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_grid_dim() -> usize {
    50
}

fn default_sigma() -> f64 {
    2.5
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_iterations() -> usize {
    500
}

fn default_seed() -> u64 {
    12345
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            x_dim: default_grid_dim(),
            y_dim: default_grid_dim(),
            sigma: default_sigma(),
            learning_rate: default_learning_rate(),
            iterations: default_iterations(),
            neighborhood: Neighborhood::default(),
            initialization: Initialization::default(),
            random_order: false,
            seed: default_seed(),
        }
    }
}

/// Linkage criterion for agglomerative clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    #[default]
    Ward,
    Complete,
    Average,
    Single,
}

/// Configuration for the consensus meta-clustering search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaClusteringConfig {
    /// Smallest candidate cluster count
    #[serde(default = "default_min_k")]
    pub min_k: usize,

    /// Largest candidate cluster count (inclusive)
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Resampling repeats per candidate
    #[serde(default = "default_meta_iterations")]
    pub iterations: usize,

    /// Fraction of SOM nodes drawn in each repeat
    #[serde(default = "default_resample_proportion")]
    pub resample_proportion: f64,

    #[serde(default)]
    pub linkage: Linkage,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_min_k() -> usize {
    10
}

fn default_max_k() -> usize {
    20
}

fn default_meta_iterations() -> usize {
    1
}

fn default_resample_proportion() -> f64 {
    0.6
}

impl Default for MetaClusteringConfig {
    fn default() -> Self {
        Self {
            min_k: default_min_k(),
            max_k: default_max_k(),
            iterations: default_meta_iterations(),
            resample_proportion: default_resample_proportion(),
            linkage: Linkage::default(),
            seed: default_seed(),
        }
    }
}

/// Configuration for the MST image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationConfig {
    /// Plotted node count is `node_factor * best_k`
    #[serde(default = "default_node_factor")]
    pub node_factor: usize,

    /// Node circle radius in pixels
    #[serde(default = "default_node_radius")]
    pub node_radius: u32,

    /// RGB color of MST edges
    #[serde(default = "default_edge_color")]
    pub edge_color: [u8; 3],

    #[serde(default = "default_image_size")]
    pub width: u32,

    #[serde(default = "default_image_size")]
    pub height: u32,
}

fn default_node_factor() -> usize {
    4
}

fn default_node_radius() -> u32 {
    10
}

fn default_edge_color() -> [u8; 3] {
    [0, 0, 255] // blue
}

fn default_image_size() -> u32 {
    1200
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            node_factor: default_node_factor(),
            node_radius: default_node_radius(),
            edge_color: default_edge_color(),
            width: default_image_size(),
            height: default_image_size(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub som: SomConfig,

    #[serde(default)]
    pub meta: MetaClusteringConfig,

    #[serde(default)]
    pub visualization: VisualizationConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
