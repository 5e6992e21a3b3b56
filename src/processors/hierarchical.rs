//! Agglomerative hierarchical clustering.
//!
//! Uses the nearest-neighbor-chain algorithm over a condensed distance
//! matrix with Lance–Williams updates, which is O(n²) in time and memory
//! for the reducible linkages supported here (ward, complete, average,
//! single). Ward works on squared Euclidean distances internally and
//! reports merge heights as plain distances.
//!
//! # Example
//!
//! ```
//! use flowsom_pipeline::config::Linkage;
//! use flowsom_pipeline::processors::hierarchical::agglomerative_labels;
//!
//! let data = vec![vec![0.0], vec![0.1], vec![5.0], vec![5.1]];
//! let labels = agglomerative_labels(&data, 2, Linkage::Ward).unwrap();
//! assert_eq!(labels, vec![0, 0, 1, 1]);
//! ```

use rayon::prelude::*;
use thiserror::Error;

use crate::config::Linkage;
use super::som::squared_distance;

/// Errors that can occur during hierarchical clustering.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cannot form {k} clusters from {n} points")]
    TooFewPoints { n: usize, k: usize },

    #[error("cluster count must be at least 1")]
    ZeroClusters,
}

/// Result type for clustering operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// One merge step of the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Representative leaf of the first cluster.
    pub a: usize,
    /// Representative leaf of the second cluster.
    pub b: usize,
    /// Linkage distance at which the clusters were joined.
    pub distance: f64,
    /// Number of leaves in the merged cluster.
    pub size: usize,
}

/// Merge history over `n` leaves, sorted by ascending distance.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    pub n: usize,
    pub merges: Vec<Merge>,
}

/// Upper-triangle distance matrix stored as a flat vector.
struct CondensedMatrix {
    n: usize,
    data: Vec<f64>,
}

impl CondensedMatrix {
    /// Pairwise distances, computed in parallel by row.
    fn from_points(points: &[Vec<f64>], squared: bool) -> Self {
        let n = points.len();
        let data: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let pi = &points[i];
                (i + 1..n).map(move |j| {
                    let d = squared_distance(pi, &points[j]);
                    if squared {
                        d
                    } else {
                        d.sqrt()
                    }
                })
            })
            .collect();
        Self { n, data }
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        self.n * i - i * (i + 1) / 2 + (j - i - 1)
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }
}

/// Lance–Williams distance from cluster `k` to the union of `a` and `b`.
#[inline]
fn lance_williams(
    method: Linkage,
    d_ka: f64,
    d_kb: f64,
    d_ab: f64,
    n_a: f64,
    n_b: f64,
    n_k: f64,
) -> f64 {
    match method {
        Linkage::Ward => ((n_a + n_k) * d_ka + (n_b + n_k) * d_kb - n_k * d_ab) / (n_a + n_b + n_k),
        Linkage::Complete => d_ka.max(d_kb),
        Linkage::Average => (n_a * d_ka + n_b * d_kb) / (n_a + n_b),
        Linkage::Single => d_ka.min(d_kb),
    }
}

/// Build the full dendrogram of `points` under the given linkage.
pub fn linkage(points: &[Vec<f64>], method: Linkage) -> Dendrogram {
    let n = points.len();
    if n < 2 {
        return Dendrogram {
            n,
            merges: Vec::new(),
        };
    }

    let squared = method == Linkage::Ward;
    let mut dist = CondensedMatrix::from_points(points, squared);
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    let mut merges = Vec::with_capacity(n - 1);
    let mut chain: Vec<usize> = Vec::with_capacity(n);

    'merge: while merges.len() < n - 1 {
        if chain.is_empty() {
            // Restart from the lowest active cluster
            if let Some(first) = active.iter().position(|&a| a) {
                chain.push(first);
            }
        }

        // Grow the chain until two clusters are reciprocal nearest neighbors
        let (a, b, d_ab) = loop {
            let a = chain[chain.len() - 1];
            let prev = if chain.len() >= 2 {
                Some(chain[chain.len() - 2])
            } else {
                None
            };

            // total_cmp gives NaN distances a fixed place in the order
            let mut best = prev.map(|p| (p, dist.get(a, p)));
            for j in 0..n {
                if j == a || !active[j] {
                    continue;
                }
                let d = dist.get(a, j);
                if best.map_or(true, |(_, best_d)| d.total_cmp(&best_d).is_lt()) {
                    best = Some((j, d));
                }
            }
            let Some((best, best_d)) = best else {
                break 'merge;
            };

            if Some(best) == prev {
                chain.pop();
                chain.pop();
                break (a, best, best_d);
            }
            chain.push(best);
        };

        // The merged cluster lives on at the lower index
        let (keep, gone) = if a < b { (a, b) } else { (b, a) };
        let (n_a, n_b) = (size[a] as f64, size[b] as f64);

        for k in 0..n {
            if !active[k] || k == a || k == b {
                continue;
            }
            let updated = lance_williams(
                method,
                dist.get(k, a),
                dist.get(k, b),
                d_ab,
                n_a,
                n_b,
                size[k] as f64,
            );
            dist.set(k, keep, updated);
        }

        active[gone] = false;
        size[keep] = size[a] + size[b];
        merges.push(Merge {
            a: keep,
            b: gone,
            distance: if squared { d_ab.max(0.0).sqrt() } else { d_ab },
            size: size[keep],
        });
    }

    // Stable: ties keep execution order, so children precede parents
    merges.sort_by(|x, y| x.distance.total_cmp(&y.distance));

    Dendrogram { n, merges }
}

fn find_root(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

impl Dendrogram {
    /// Flat labels for `k` clusters.
    ///
    /// Applies the `n - k` lowest merges. Labels run `0..k` and are numbered
    /// in order of each cluster's first leaf.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        if k == 0 {
            return Err(ClusterError::ZeroClusters);
        }
        if k > self.n {
            return Err(ClusterError::TooFewPoints { n: self.n, k });
        }

        let mut parent: Vec<usize> = (0..self.n).collect();
        for merge in self.merges.iter().take(self.n - k) {
            let ra = find_root(&mut parent, merge.a);
            let rb = find_root(&mut parent, merge.b);
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        let mut root_label = vec![usize::MAX; self.n];
        let mut next = 0usize;
        let mut labels = Vec::with_capacity(self.n);
        for leaf in 0..self.n {
            let root = find_root(&mut parent, leaf);
            if root_label[root] == usize::MAX {
                root_label[root] = next;
                next += 1;
            }
            labels.push(root_label[root]);
        }

        Ok(labels)
    }
}

/// Cluster `points` into exactly `k` groups.
///
/// # Errors
///
/// Returns an error if `k` is zero or larger than the number of points.
pub fn agglomerative_labels(points: &[Vec<f64>], k: usize, method: Linkage) -> Result<Vec<usize>> {
    if k == 0 {
        return Err(ClusterError::ZeroClusters);
    }
    if k > points.len() {
        return Err(ClusterError::TooFewPoints { n: points.len(), k });
    }
    linkage(points, method).cut(k)
}
