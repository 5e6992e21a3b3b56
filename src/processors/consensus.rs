//! Consensus meta-clustering of SOM nodes.
//!
//! For every candidate cluster count `k` the node weights are resampled,
//! clustered, and the pairwise co-clustering frequencies accumulated into a
//! consensus matrix. Each matrix is scored by the area under its empirical
//! CDF; the best `k` is the one after which that area grows the most.
//!
//! Candidates are independent and evaluated in parallel. Each draws from its
//! own `ChaCha8Rng` seeded with `seed + k`, so results do not depend on the
//! thread schedule.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MetaClusteringConfig;
use super::hierarchical::{agglomerative_labels, ClusterError};

/// Number of histogram bins used for the CDF area.
const CDF_BINS: usize = 10;

/// Guards the consensus ratio against pairs that were never sampled.
const CONSENSUS_EPSILON: f64 = 1e-8;

/// Errors that can occur during meta-clustering.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("invalid cluster range {min_k}..={max_k}: need 2 <= min_k <= max_k")]
    InvalidRange { min_k: usize, max_k: usize },

    #[error("max_k {max_k} exceeds the number of nodes ({nodes})")]
    TooFewNodes { max_k: usize, nodes: usize },

    #[error("resample proportion must be in (0, 1], got {0}")]
    InvalidProportion(f64),

    #[error("resample of {sample} nodes is too small for k = {k}")]
    SampleTooSmall { sample: usize, k: usize },

    #[error("at least one resampling iteration is required")]
    ZeroIterations,

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Outcome of the best-k search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaClustering {
    pub best_k: usize,
    /// Candidate cluster counts, ascending.
    pub candidates: Vec<usize>,
    /// CDF area per candidate.
    pub areas: Vec<f64>,
    /// Relative area increase per candidate (one fewer than `candidates`).
    pub deltas: Vec<f64>,
    /// Meta-cluster id of each SOM node, in `0..best_k`.
    pub node_labels: Vec<usize>,
}

/// Pairwise consensus values, upper triangle only.
#[derive(Debug, Clone)]
pub struct ConsensusMatrix {
    pub n: usize,
    values: Vec<f64>,
}

#[inline]
fn pair_index(n: usize, i: usize, j: usize) -> usize {
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

impl ConsensusMatrix {
    /// Consensus between nodes `i` and `j`; 1 on the diagonal.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match i.cmp(&j) {
            std::cmp::Ordering::Equal => 1.0,
            std::cmp::Ordering::Less => self.values[pair_index(self.n, i, j)],
            std::cmp::Ordering::Greater => self.values[pair_index(self.n, j, i)],
        }
    }

    /// Area under the empirical CDF of all `n²` entries.
    ///
    /// Uses a 10-bin density histogram over `[min, max]`, summing the
    /// cumulative density times bin width. A constant matrix is binned over
    /// `[v - 0.5, v + 0.5]`.
    pub fn cdf_area(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }

        let (mut lo, mut hi) = (1.0f64, 1.0f64);
        for &v in &self.values {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / CDF_BINS as f64;
        let bin = |v: f64| (((v - lo) / width) as usize).min(CDF_BINS - 1);

        // Off-diagonal entries appear twice in the full matrix
        let mut counts = [0u64; CDF_BINS];
        counts[bin(1.0)] += self.n as u64;
        for &v in &self.values {
            counts[bin(v)] += 2;
        }

        let total = (self.n * self.n) as f64;
        let mut cumulative = 0.0;
        let mut area = 0.0;
        for &count in &counts {
            cumulative += count as f64 / (total * width);
            area += cumulative * width;
        }
        area
    }
}

/// Best `k` from per-candidate CDF areas.
///
/// Returns the chosen `k` and the relative area increases. Ties go to the
/// smallest `k`; a single candidate is chosen outright.
pub fn select_best_k(candidates: &[usize], areas: &[f64]) -> (usize, Vec<f64>) {
    let deltas: Vec<f64> = areas
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    let mut best = 0usize;
    for (i, &d) in deltas.iter().enumerate() {
        if d > deltas[best] {
            best = i;
        }
    }

    (candidates.get(best).copied().unwrap_or(0), deltas)
}

/// Resampling-based consensus clustering.
pub struct ConsensusCluster {
    config: MetaClusteringConfig,
}

impl ConsensusCluster {
    /// Creates a new search with the given configuration.
    pub fn new(config: MetaClusteringConfig) -> Self {
        Self { config }
    }

    /// Number of nodes drawn per resample for `n` nodes.
    #[inline]
    fn sample_size(&self, n: usize) -> usize {
        ((n as f64 * self.config.resample_proportion).floor() as usize).min(n)
    }

    fn validate(&self, n: usize) -> Result<()> {
        let (min_k, max_k) = (self.config.min_k, self.config.max_k);
        if min_k < 2 || min_k > max_k {
            return Err(ConsensusError::InvalidRange { min_k, max_k });
        }
        if max_k > n {
            return Err(ConsensusError::TooFewNodes { max_k, nodes: n });
        }
        let p = self.config.resample_proportion;
        if !(p > 0.0 && p <= 1.0) {
            return Err(ConsensusError::InvalidProportion(p));
        }
        if self.config.iterations == 0 {
            return Err(ConsensusError::ZeroIterations);
        }
        let sample = self.sample_size(n);
        if sample < max_k {
            return Err(ConsensusError::SampleTooSmall { sample, k: max_k });
        }
        Ok(())
    }

    /// Consensus matrix for a single candidate `k`.
    pub fn consensus_matrix(&self, points: &[Vec<f64>], k: usize) -> Result<ConsensusMatrix> {
        let n = points.len();
        let pairs = n * n.saturating_sub(1) / 2;
        let sample_size = self.sample_size(n);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(k as u64));

        let mut co_clustered = vec![0u32; pairs];
        let mut co_sampled = vec![0u32; pairs];

        for _ in 0..self.config.iterations {
            let mut sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
            sample.sort_unstable();

            let subset: Vec<Vec<f64>> = sample.iter().map(|&i| points[i].clone()).collect();
            let labels = agglomerative_labels(&subset, k, self.config.linkage)?;

            for a in 0..sample.len() {
                for b in a + 1..sample.len() {
                    let idx = pair_index(n, sample[a], sample[b]);
                    co_sampled[idx] += 1;
                    if labels[a] == labels[b] {
                        co_clustered[idx] += 1;
                    }
                }
            }
        }

        let values = co_clustered
            .iter()
            .zip(&co_sampled)
            .map(|(&m, &s)| m as f64 / (s as f64 + CONSENSUS_EPSILON))
            .collect();

        Ok(ConsensusMatrix { n, values })
    }

    /// Search `min_k..=max_k` and label every point with the chosen `k`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range, proportion or iteration count is
    /// invalid for the number of points.
    pub fn fit(&self, points: &[Vec<f64>]) -> Result<MetaClustering> {
        self.validate(points.len())?;

        let candidates: Vec<usize> = (self.config.min_k..=self.config.max_k).collect();
        let areas = candidates
            .par_iter()
            .map(|&k| self.consensus_matrix(points, k).map(|m| m.cdf_area()))
            .collect::<Result<Vec<f64>>>()?;

        for (k, area) in candidates.iter().zip(&areas) {
            log::debug!("k = {}: CDF area {:.6}", k, area);
        }

        let (best_k, deltas) = select_best_k(&candidates, &areas);
        let node_labels = agglomerative_labels(points, best_k, self.config.linkage)?;

        Ok(MetaClustering {
            best_k,
            candidates,
            areas,
            deltas,
            node_labels,
        })
    }
}
