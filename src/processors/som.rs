//! Self-organizing map grid and competitive-learning trainer.
//!
//! The grid is `x_dim × y_dim` nodes stored row-major (`i * y_dim + j`),
//! each holding a weight vector with one entry per marker. Training is the
//! classic single-sample Kohonen update:
//!
//! ```text
//! eta(t)   = lr    / (1 + t / (T/2))
//! sigma(t) = sigma / (1 + t / (T/2))
//! w       += eta(t) * h(bmu, sigma(t)) * (x - w)
//! ```
//!
//! Row `t mod R` is presented at step `t`, or a seeded random row when
//! `random_order` is set, so a fixed seed always yields the same grid.

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Initialization, Neighborhood, SomConfig};

/// Errors that can occur while building or training a SOM.
#[derive(Debug, Error)]
pub enum SomError {
    #[error("no training rows")]
    NoData,

    #[error("grid dimensions must be positive, got {x_dim}x{y_dim}")]
    EmptyGrid { x_dim: usize, y_dim: usize },

    #[error("row {row} has {found} values, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("no marker columns to train on")]
    ZeroDimension,
}

/// Result type for SOM operations.
pub type Result<T> = std::result::Result<T, SomError>;

/// A trained (or initialised) SOM grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomGrid {
    pub x_dim: usize,
    pub y_dim: usize,
    /// Weight vector length (number of markers).
    pub dim: usize,
    /// Node weights, row-major. Shape: [x_dim * y_dim][dim].
    pub weights: Vec<Vec<f64>>,
}

impl SomGrid {
    /// Grid with all weights set to zero.
    pub fn zeros(x_dim: usize, y_dim: usize, dim: usize) -> Self {
        Self {
            x_dim,
            y_dim,
            dim,
            weights: vec![vec![0.0; dim]; x_dim * y_dim],
        }
    }

    /// Total number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.weights.len()
    }

    /// Grid position `(i, j)` of a node index.
    #[inline]
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.y_dim, index % self.y_dim)
    }

    /// Index of the best matching unit for `input`.
    ///
    /// Smallest squared Euclidean distance wins; ties go to the lowest index.
    pub fn winner(&self, input: &[f64]) -> usize {
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (idx, w) in self.weights.iter().enumerate() {
            let dist = squared_distance(w, input);
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best
    }

    /// Best matching unit for every row, computed in parallel.
    pub fn winners(&self, data: &[Vec<f64>]) -> Vec<usize> {
        data.par_iter().map(|row| self.winner(row)).collect()
    }

    /// Mean distance between each row and its BMU weight vector.
    pub fn quantization_error(&self, data: &[Vec<f64>]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let total: f64 = data
            .par_iter()
            .map(|row| squared_distance(&self.weights[self.winner(row)], row).sqrt())
            .sum();
        total / data.len() as f64
    }
}

/// Squared Euclidean distance between two equal-length vectors.
#[inline]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// `n` evenly spaced values over `[start, end]` (numpy's `linspace`).
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Rows as an `n × dim` matrix.
fn to_matrix(data: &[Vec<f64>], dim: usize) -> Array2<f64> {
    Array2::from_shape_fn((data.len(), dim), |(r, c)| data[r][c])
}

/// Column means and sample covariance (`dim × dim`, divisor `n - 1`).
fn mean_and_covariance(data: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let means = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()));
    let centered = data - &means.view().insert_axis(Axis(0));
    let denom = data.nrows().saturating_sub(1).max(1) as f64;
    let cov = centered.t().dot(&centered) / denom;
    (means, cov)
}

/// Leading eigenvectors of a symmetric matrix by power iteration with deflation.
///
/// Each vector is unit length with its largest-magnitude entry positive.
/// A zero vector is returned for components the matrix does not have.
pub fn principal_components(matrix: &Array2<f64>, count: usize) -> Vec<Array1<f64>> {
    const MAX_ITER: usize = 500;
    const TOL: f64 = 1e-12;

    let dim = matrix.nrows();
    let mut work = matrix.to_owned();
    let mut components = Vec::with_capacity(count);

    for _ in 0..count {
        // Deterministic start vector that is not orthogonal to typical leads
        let mut v = Array1::from_shape_fn(dim, |i| 1.0 + i as f64 / dim as f64);
        let start_norm = v.dot(&v).sqrt();
        if start_norm > 0.0 {
            v /= start_norm;
        }
        let mut eigenvalue = 0.0;

        for _ in 0..MAX_ITER {
            let mut next = work.dot(&v);
            let norm = next.dot(&next).sqrt();
            if norm < TOL {
                eigenvalue = 0.0;
                v = Array1::zeros(dim);
                break;
            }
            next /= norm;
            let delta = (&next - &v).mapv(f64::abs).sum();
            v = next;
            eigenvalue = norm;
            if delta < 1e-10 {
                break;
            }
        }

        // Sign convention: largest-magnitude entry positive
        if let Some(&lead) = v.iter().max_by(|a, b| a.abs().total_cmp(&b.abs())) {
            if lead < 0.0 {
                v.mapv_inplace(|x| -x);
            }
        }

        // Deflate: A -= lambda * v v^T
        let column = v.view().insert_axis(Axis(1));
        let row = v.view().insert_axis(Axis(0));
        work = work - column.dot(&row) * eigenvalue;
        components.push(v);
    }

    components
}

/// Scale `v` to unit length in place, returning its original norm.
fn normalize(v: &mut [f64]) -> f64 {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    norm
}

/// Neighborhood weight of node `(i, j)` around winner `(ci, cj)`.
#[inline]
fn neighborhood_weight(kind: Neighborhood, di: f64, dj: f64, sigma: f64) -> f64 {
    match kind {
        Neighborhood::Gaussian => {
            let d = 2.0 * sigma * sigma;
            (-(di * di) / d).exp() * (-(dj * dj) / d).exp()
        }
        Neighborhood::MexicanHat => {
            let p = di * di + dj * dj;
            let d = 2.0 * sigma * sigma;
            (-p / d).exp() * (1.0 - 2.0 / d * p)
        }
        Neighborhood::Bubble => {
            if di.abs() < sigma && dj.abs() < sigma {
                1.0
            } else {
                0.0
            }
        }
        Neighborhood::Triangle => (sigma - di.abs()).max(0.0) * (sigma - dj.abs()).max(0.0),
    }
}

/// Asymptotic decay used for both learning rate and sigma.
#[inline]
fn asymptotic_decay(initial: f64, t: usize, max_iter: usize) -> f64 {
    initial / (1.0 + t as f64 / (max_iter as f64 / 2.0))
}

/// Competitive-learning SOM trainer.
pub struct SomTrainer {
    config: SomConfig,
    rng: ChaCha8Rng,
}

impl SomTrainer {
    /// Creates a new trainer with the given configuration.
    pub fn new(config: SomConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Learning rate at a given iteration.
    #[inline]
    pub fn learning_rate(&self, iteration: usize) -> f64 {
        asymptotic_decay(self.config.learning_rate, iteration, self.config.iterations)
    }

    /// Neighborhood spread at a given iteration.
    #[inline]
    pub fn sigma(&self, iteration: usize) -> f64 {
        asymptotic_decay(self.config.sigma, iteration, self.config.iterations)
    }

    fn validate(&self, data: &[Vec<f64>]) -> Result<usize> {
        if self.config.x_dim == 0 || self.config.y_dim == 0 {
            return Err(SomError::EmptyGrid {
                x_dim: self.config.x_dim,
                y_dim: self.config.y_dim,
            });
        }
        let first = data.first().ok_or(SomError::NoData)?;
        let dim = first.len();
        if dim == 0 {
            return Err(SomError::ZeroDimension);
        }
        if let Some((row, r)) = data.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(SomError::DimensionMismatch {
                row,
                expected: dim,
                found: r.len(),
            });
        }
        Ok(dim)
    }

    /// Initial grid, before any training updates.
    pub fn initialize(&mut self, data: &[Vec<f64>]) -> Result<SomGrid> {
        let dim = self.validate(data)?;
        let (x_dim, y_dim) = (self.config.x_dim, self.config.y_dim);
        let mut grid = SomGrid::zeros(x_dim, y_dim, dim);

        match self.config.initialization {
            Initialization::Pca => {
                let (means, cov) = mean_and_covariance(&to_matrix(data, dim));
                let pcs = principal_components(&cov, 2);
                let c1s = linspace(-1.0, 1.0, x_dim);
                let c2s = linspace(-1.0, 1.0, y_dim);

                for (i, &c1) in c1s.iter().enumerate() {
                    for (j, &c2) in c2s.iter().enumerate() {
                        let w = &means + &(&pcs[0] * c1) + &(&pcs[1] * c2);
                        grid.weights[i * y_dim + j] = w.to_vec();
                    }
                }
            }
            Initialization::Random => {
                for w in grid.weights.iter_mut() {
                    for x in w.iter_mut() {
                        *x = self.rng.gen_range(-1.0..1.0);
                    }
                    normalize(w);
                }
            }
        }

        Ok(grid)
    }

    /// Train a fresh grid on `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty, rows differ in length, there are
    /// no columns, or either grid dimension is zero.
    pub fn train(&mut self, data: &[Vec<f64>]) -> Result<SomGrid> {
        let mut grid = self.initialize(data)?;
        let max_iter = self.config.iterations;
        let n = data.len();

        for t in 0..max_iter {
            let row = if self.config.random_order {
                self.rng.gen_range(0..n)
            } else {
                t % n
            };
            self.update(&mut grid, &data[row], t);
        }

        log::debug!(
            "SOM {}x{} trained for {} iterations, quantization error {:.4}",
            grid.x_dim,
            grid.y_dim,
            max_iter,
            grid.quantization_error(data)
        );

        Ok(grid)
    }

    /// One Kohonen update towards `input`.
    fn update(&self, grid: &mut SomGrid, input: &[f64], t: usize) {
        let winner = grid.winner(input);
        let (ci, cj) = grid.position(winner);
        let eta = self.learning_rate(t);
        let sig = self.sigma(t);
        let kind = self.config.neighborhood;
        let y_dim = grid.y_dim;

        grid.weights
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, w)| {
                let di = (idx / y_dim) as f64 - ci as f64;
                let dj = (idx % y_dim) as f64 - cj as f64;
                let g = eta * neighborhood_weight(kind, di, dj, sig);
                if g != 0.0 {
                    for (wk, xk) in w.iter_mut().zip(input) {
                        *wk += g * (xk - *wk);
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_config() -> SomConfig {
        SomConfig {
            x_dim: 4,
            y_dim: 3,
            sigma: 1.0,
            learning_rate: 0.5,
            iterations: 200,
            ..SomConfig::default()
        }
    }

    fn two_blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f64 * 0.01;
            data.push(vec![0.0 + jitter, 0.0 - jitter]);
            data.push(vec![10.0 - jitter, 10.0 + jitter]);
        }
        data
    }

    #[test]
    fn test_grid_positions() {
        let grid = SomGrid::zeros(4, 3, 2);
        assert_eq!(grid.num_nodes(), 12);
        assert_eq!(grid.position(0), (0, 0));
        assert_eq!(grid.position(5), (1, 2));
        assert_eq!(grid.position(11), (3, 2));
    }

    #[test]
    fn test_winner_ties_lowest_index() {
        let mut grid = SomGrid::zeros(1, 3, 1);
        grid.weights = vec![vec![1.0], vec![-1.0], vec![1.0]];
        assert_eq!(grid.winner(&[1.0]), 0);
        assert_eq!(grid.winner(&[0.0]), 0);
        assert_eq!(grid.winner(&[-0.9]), 1);
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(-1.0, 1.0, 3), vec![-1.0, 0.0, 1.0]);
        assert_eq!(linspace(-1.0, 1.0, 1), vec![-1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_principal_components_diagonal() {
        let cov = array![[1.0, 0.0], [0.0, 4.0]];
        let pcs = principal_components(&cov, 2);
        assert!((pcs[0][0]).abs() < 1e-6);
        assert!((pcs[0][1] - 1.0).abs() < 1e-6);
        assert!((pcs[1][0] - 1.0).abs() < 1e-6);
        assert!((pcs[1][1]).abs() < 1e-6);
    }

    #[test]
    fn test_principal_components_single_dimension() {
        let cov = array![[2.0]];
        let pcs = principal_components(&cov, 2);
        assert_eq!(pcs[0], array![1.0]);
        assert_eq!(pcs[1], array![0.0]);
    }

    #[test]
    fn test_mean_and_covariance() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 10.0]];
        let (means, cov) = mean_and_covariance(&to_matrix(&data, 2));
        assert_eq!(means, array![3.0, 6.0]);
        assert_eq!(cov, array![[4.0, 8.0], [8.0, 16.0]]);

        // Perfectly correlated columns share one direction
        let pcs = principal_components(&cov, 1);
        let expected = 1.0 / 5f64.sqrt();
        assert!((pcs[0][0] - expected).abs() < 1e-6);
        assert!((pcs[0][1] - 2.0 * expected).abs() < 1e-6);
    }

    #[test]
    fn test_neighborhood_functions() {
        let g = neighborhood_weight(Neighborhood::Gaussian, 0.0, 0.0, 2.5);
        assert!((g - 1.0).abs() < 1e-12);
        assert!(neighborhood_weight(Neighborhood::Gaussian, 3.0, 0.0, 2.5) < g);

        assert_eq!(neighborhood_weight(Neighborhood::Bubble, 1.0, 1.0, 2.0), 1.0);
        assert_eq!(neighborhood_weight(Neighborhood::Bubble, 2.0, 0.0, 2.0), 0.0);

        assert_eq!(neighborhood_weight(Neighborhood::Triangle, 1.0, 0.0, 2.0), 2.0);
        assert_eq!(neighborhood_weight(Neighborhood::Triangle, 3.0, 0.0, 2.0), 0.0);

        assert_eq!(neighborhood_weight(Neighborhood::MexicanHat, 0.0, 0.0, 1.0), 1.0);
        assert!(neighborhood_weight(Neighborhood::MexicanHat, 2.0, 0.0, 1.0) < 0.0);
    }

    #[test]
    fn test_decay_halves_at_end() {
        let trainer = SomTrainer::new(SomConfig::default());
        assert_eq!(trainer.learning_rate(0), 0.1);
        assert!((trainer.sigma(500) - 2.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_train_rejects_bad_input() {
        let mut trainer = SomTrainer::new(small_config());
        assert!(matches!(trainer.train(&[]), Err(SomError::NoData)));

        let ragged = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            trainer.train(&ragged),
            Err(SomError::DimensionMismatch { row: 1, .. })
        ));

        let mut empty_grid = SomTrainer::new(SomConfig {
            x_dim: 0,
            ..small_config()
        });
        assert!(matches!(
            empty_grid.train(&two_blobs()),
            Err(SomError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn test_train_is_deterministic() {
        let data = two_blobs();
        let config = SomConfig {
            random_order: true,
            ..small_config()
        };

        let a = SomTrainer::new(config.clone()).train(&data).unwrap();
        let b = SomTrainer::new(config).train(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_reduces_quantization_error() {
        let data = two_blobs();
        let config = SomConfig {
            initialization: Initialization::Random,
            ..small_config()
        };

        let initial = SomTrainer::new(config.clone()).initialize(&data).unwrap();
        let trained = SomTrainer::new(config).train(&data).unwrap();

        assert!(trained.quantization_error(&data) < initial.quantization_error(&data));
        assert!(trained.quantization_error(&data) < 1.0);
    }

    #[test]
    fn test_pca_init_spans_data() {
        let data = two_blobs();
        let mut trainer = SomTrainer::new(small_config());
        let grid = trainer.initialize(&data).unwrap();

        // Middle column, first and last row: opposite sides of the mean along pc1
        let first = &grid.weights[1];
        let last = &grid.weights[3 * 3 + 1];
        assert!(first[0] < 5.0 && last[0] > 5.0);
        assert!(first[1] < 5.0 && last[1] > 5.0);
    }
}
