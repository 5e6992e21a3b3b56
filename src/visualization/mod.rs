//! Minimum-spanning-tree rendering of a trained SOM.
//!
//! The grid nodes are first coarsened into `node_factor * best_k` groups by
//! agglomerative clustering of their weights. Each group is placed at the
//! mean grid position of its nodes and coloured by its majority
//! meta-cluster. Groups are connected by the minimum spanning tree over
//! their weight centroids and the result is drawn to a PNG with plotters.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::{Linkage, VisualizationConfig};
use crate::processors::hierarchical::{agglomerative_labels, ClusterError};
use crate::processors::som::{squared_distance, SomGrid};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty SOM grid")]
    EmptyGrid,

    #[error("{labels} meta-cluster labels for {nodes} nodes")]
    LabelMismatch { nodes: usize, labels: usize },

    #[error("Grouping failed: {0}")]
    Cluster(#[from] ClusterError),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Color palette for cluster visualization.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (255, 255, 51),  // Yellow
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (153, 153, 153), // Gray
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
    (50, 205, 50),   // Lime Green
    (255, 20, 147),  // Deep Pink
    (0, 191, 255),   // Deep Sky Blue
    (255, 215, 0),   // Gold
];

/// Extra space between the image border and the outermost node.
const MARGIN: i32 = 10;

/// One MST edge between two groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

/// Coarsened SOM topology ready for drawing.
#[derive(Debug, Clone)]
pub struct MstGraph {
    /// Mean grid position `(i, j)` of each group.
    pub positions: Vec<(f64, f64)>,
    /// Majority meta-cluster of each group.
    pub labels: Vec<usize>,
    /// Number of SOM nodes in each group.
    pub sizes: Vec<usize>,
    pub edges: Vec<Edge>,
    /// Grid extent, for scaling positions to pixels.
    pub x_dim: usize,
    pub y_dim: usize,
}

/// Prim's minimum spanning tree over Euclidean distances.
///
/// Returns `n - 1` edges in the order they were added, starting from point
/// 0. Ties are broken towards the lowest index.
pub fn minimum_spanning_tree(points: &[Vec<f64>]) -> Vec<Edge> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    in_tree[0] = true;
    for j in 1..n {
        best[j] = squared_distance(&points[0], &points[j]).sqrt();
    }

    for _ in 1..n {
        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < best[next]) {
                next = j;
            }
        }

        in_tree[next] = true;
        edges.push(Edge {
            from: parent[next],
            to: next,
            weight: best[next],
        });

        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = squared_distance(&points[next], &points[j]).sqrt();
            if d < best[j] {
                best[j] = d;
                parent[j] = next;
            }
        }
    }

    edges
}

/// Coarsen the grid and connect the groups with their MST.
///
/// # Arguments
///
/// * `grid` - Trained SOM
/// * `node_labels` - Meta-cluster of every grid node
/// * `best_k` - Number of meta-clusters
/// * `node_factor` - Groups per meta-cluster
pub fn build_mst_graph(
    grid: &SomGrid,
    node_labels: &[usize],
    best_k: usize,
    node_factor: usize,
) -> Result<MstGraph> {
    let n = grid.num_nodes();
    if n == 0 {
        return Err(VisualizationError::EmptyGrid);
    }
    if node_labels.len() != n {
        return Err(VisualizationError::LabelMismatch {
            nodes: n,
            labels: node_labels.len(),
        });
    }

    let num_groups = (node_factor * best_k).clamp(1, n);
    let groups = agglomerative_labels(&grid.weights, num_groups, Linkage::Ward)?;

    let mut centroids = vec![vec![0.0; grid.dim]; num_groups];
    let mut positions = vec![(0.0, 0.0); num_groups];
    let mut sizes = vec![0usize; num_groups];
    let num_labels = node_labels.iter().copied().max().unwrap_or(0) + 1;
    let mut votes = vec![vec![0usize; num_labels]; num_groups];

    for (node, &g) in groups.iter().enumerate() {
        let (i, j) = grid.position(node);
        sizes[g] += 1;
        positions[g].0 += i as f64;
        positions[g].1 += j as f64;
        for (c, w) in centroids[g].iter_mut().zip(&grid.weights[node]) {
            *c += w;
        }
        votes[g][node_labels[node]] += 1;
    }

    for g in 0..num_groups {
        let size = sizes[g].max(1) as f64;
        positions[g].0 /= size;
        positions[g].1 /= size;
        centroids[g].iter_mut().for_each(|c| *c /= size);
    }

    // Majority label, ties to the lowest id
    let labels: Vec<usize> = votes
        .iter()
        .map(|v| {
            let mut best = 0;
            for (label, &count) in v.iter().enumerate() {
                if count > v[best] {
                    best = label;
                }
            }
            best
        })
        .collect();

    let edges = minimum_spanning_tree(&centroids);

    Ok(MstGraph {
        positions,
        labels,
        sizes,
        edges,
        x_dim: grid.x_dim,
        y_dim: grid.y_dim,
    })
}

/// Map a grid position to pixel coordinates.
fn to_pixel(graph: &MstGraph, pos: (f64, f64), config: &VisualizationConfig) -> (i32, i32) {
    let margin = config.node_radius as i32 + MARGIN;
    let span_x = (config.width as i32 - 2 * margin).max(1) as f64;
    let span_y = (config.height as i32 - 2 * margin).max(1) as f64;
    let max_i = (graph.x_dim.max(2) - 1) as f64;
    let max_j = (graph.y_dim.max(2) - 1) as f64;

    (
        margin + (pos.0 / max_i * span_x).round() as i32,
        margin + (pos.1 / max_j * span_y).round() as i32,
    )
}

/// Draw an MST graph and save it as PNG.
///
/// Edges are drawn first in `config.edge_color`, then one filled circle per
/// group coloured by its meta-cluster. No text is rendered.
pub fn plot_mst(output_path: &Path, graph: &MstGraph, config: &VisualizationConfig) -> Result<()> {
    if graph.positions.is_empty() {
        return Err(VisualizationError::EmptyGrid);
    }

    let pixels: Vec<(i32, i32)> = graph
        .positions
        .iter()
        .map(|&p| to_pixel(graph, p, config))
        .collect();

    let root = BitMapBackend::new(output_path, (config.width, config.height)).into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let [r, g, b] = config.edge_color;
    let edge_style = RGBColor(r, g, b).stroke_width(2);
    for edge in &graph.edges {
        root.draw(&PathElement::new(
            vec![pixels[edge.from], pixels[edge.to]],
            edge_style,
        ))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    }

    for (pixel, &label) in pixels.iter().zip(&graph.labels) {
        let c = CLUSTER_COLORS[label % CLUSTER_COLORS.len()];
        root.draw(&Circle::new(*pixel, config.node_radius, RGBColor(c.0, c.1, c.2).filled()))
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    }

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Build and draw the MST for a trained grid in one step.
pub fn render_mst(
    output_path: &Path,
    grid: &SomGrid,
    node_labels: &[usize],
    best_k: usize,
    config: &VisualizationConfig,
) -> Result<MstGraph> {
    let graph = build_mst_graph(grid, node_labels, best_k, config.node_factor)?;
    plot_mst(output_path, &graph, config)?;
    log::debug!(
        "MST with {} groups written to {}",
        graph.positions.len(),
        output_path.display()
    );
    Ok(graph)
}
