//! Adaptive clustering of embedding vectors.
//!
//! Partitions a matrix of (already L2-normalized) embeddings into groups
//! using one of two interchangeable strategies:
//!
//! - [`Method::Hdbscan`]: density-based, discovers the number of clusters
//!   automatically and marks low-density points as noise ([`NOISE`]).
//! - [`Method::Kmeans`]: centroid-based mini-batch k-means with a fixed
//!   target cluster count; every point is assigned, no noise.
//!
//! The strategy is a configuration-time decision, not a runtime hierarchy:
//!
//! ```
//! use shoebox_cluster::{ClusterConfig, Clusterer};
//!
//! let clusterer = Clusterer::new(ClusterConfig::default());
//! let points = vec![
//!     vec![1.0, 0.0],
//!     vec![0.99, 0.05],
//!     vec![0.0, 1.0],
//! ];
//! let result = clusterer.cluster(&points);
//! assert_eq!(result.labels.len(), 3);
//! ```
//!
//! # Output Contract
//!
//! `labels[i]` is the cluster of `points[i]`; `-1` means noise (HDBSCAN
//! only). Non-noise labels are compact (`0..m`), and `centroids[l]` is the
//! centroid of label `l`: the arithmetic mean of its members for HDBSCAN,
//! the learned center for k-means. An empty input yields empty outputs, and
//! an all-noise HDBSCAN result yields an empty centroid set — neither is an
//! error.

mod centroid;
mod hdbscan;
mod kmeans;

pub use centroid::mean;

/// Sentinel label for points that density clustering could not assign.
pub const NOISE: i32 = -1;

/// Clustering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Density-based, auto cluster count, noise-aware.
    Hdbscan,
    /// Centroid-based, fixed cluster count, no noise.
    Kmeans,
}

/// Controls clustering behavior.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Strategy to use. Default: [`Method::Hdbscan`].
    pub method: Method,

    /// Target cluster count for k-means, clamped to the number of points.
    /// Default: 8.
    pub n_clusters: usize,

    /// Mini-batch size for k-means. Default: 64.
    pub batch_size: usize,

    /// RNG seed for k-means initialization and batch sampling. Default: 42.
    pub seed: u64,

    /// Minimum points for an HDBSCAN cluster to persist. Values below 2 are
    /// clamped to 2. Default: 2.
    pub min_cluster_size: usize,

    /// HDBSCAN core-distance neighbor count. `None` means "same as
    /// `min_cluster_size`".
    pub min_samples: Option<usize>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            method: Method::Hdbscan,
            n_clusters: 8,
            batch_size: 64,
            seed: 42,
            min_cluster_size: 2,
            min_samples: None,
        }
    }
}

/// Result of a clustering run.
///
/// `labels` has one entry per input point. `centroids[l]` corresponds to
/// label `l`; noise points contribute to no centroid.
#[derive(Debug, Clone)]
pub struct Clustering {
    pub labels: Vec<i32>,
    pub centroids: Vec<Vec<f32>>,
}

impl Clustering {
    fn empty() -> Self {
        Self {
            labels: Vec::new(),
            centroids: Vec::new(),
        }
    }

    /// Number of real (non-noise) clusters.
    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    /// True if every point was labeled noise.
    pub fn is_all_noise(&self) -> bool {
        !self.labels.is_empty() && self.centroids.is_empty()
    }
}

/// Clusters embedding matrices according to a fixed configuration.
#[derive(Debug, Clone)]
pub struct Clusterer {
    cfg: ClusterConfig,
}

impl Clusterer {
    pub fn new(cfg: ClusterConfig) -> Self {
        let cfg = ClusterConfig {
            min_cluster_size: cfg.min_cluster_size.max(2),
            n_clusters: cfg.n_clusters.max(1),
            batch_size: cfg.batch_size.max(1),
            ..cfg
        };
        Self { cfg }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.cfg
    }

    /// Partitions `points` into clusters.
    ///
    /// All points must share one dimension. Empty input returns empty
    /// outputs.
    pub fn cluster(&self, points: &[Vec<f32>]) -> Clustering {
        if points.is_empty() {
            return Clustering::empty();
        }

        match self.cfg.method {
            Method::Hdbscan => {
                let min_samples = self.cfg.min_samples.unwrap_or(self.cfg.min_cluster_size);
                let labels = hdbscan::hdbscan(points, self.cfg.min_cluster_size, min_samples);
                let centroids = centroid::centroids_by_label(points, &labels);
                Clustering { labels, centroids }
            }
            Method::Kmeans => {
                let (labels, centroids) = kmeans::minibatch_kmeans(
                    points,
                    self.cfg.n_clusters,
                    self.cfg.batch_size,
                    self.cfg.seed,
                );
                Clustering { labels, centroids }
            }
        }
    }
}
