//! K-Means clustering of merged rows along two metric axes

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::data::{MergedRow, Metric};

/// Label given to rows that could not be clustered.
pub const UNCLUSTERED: i32 = -1;

/// Upper bound on the number of clusters.
pub const MAX_CLUSTERS: usize = 3;

/// Fixed seed so identical inputs always produce identical labels.
pub const KMEANS_SEED: u64 = 42;

const MAX_ITERS: u64 = 300;
const TOLERANCE: f64 = 1e-4;
const N_RUNS: usize = 10;
/// Brings any finite input to a range whose squared spreads sum without overflow
const OVERFLOW_SCALE: f64 = 1e-160;

/// A merged row with its cluster label (or [`UNCLUSTERED`])
#[derive(Debug, Clone)]
pub struct ClusteredRow {
    pub row: MergedRow,
    pub cluster: i32,
}

/// Fitted K-Means result over the valid rows
#[derive(Debug, Clone)]
pub struct ClusterModel {
    /// Number of clusters actually used
    pub n_clusters: usize,
    /// Cluster assignment per valid row
    pub labels: Array1<usize>,
    /// Cluster centroids in raw metric units (n_clusters, 2)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl ClusterModel {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over the first `sample_size` points
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size).min(self.labels.len());
        if n_samples < 2 || self.n_clusters < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = euclidean_distance(&point, &features.row(j));
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < self.n_clusters {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            // Singleton clusters score 0
            if same_cluster_distances.is_empty() {
                continue;
            }
            let a_i = same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64;

            let b_i = other_cluster_distances
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            if b_i.is_finite() && a_i.max(b_i) > 0.0 {
                silhouette_sum += (b_i - a_i) / a_i.max(b_i);
            }
        }

        silhouette_sum / n_samples as f64
    }

    /// Summary for presentation, centroids as `[x, y]` pairs
    pub fn summary(&self, features: &Array2<f64>) -> ClusterSummary {
        ClusterSummary {
            n_clusters: self.n_clusters,
            sizes: self.cluster_sizes(),
            inertia: self.inertia,
            silhouette: self.compute_silhouette_sample(features, 100),
            centroids: self
                .centroids
                .outer_iter()
                .map(|c| [c[0], c[1]])
                .collect(),
        }
    }
}

/// Cluster statistics exposed with a query response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub n_clusters: usize,
    pub sizes: Vec<usize>,
    pub inertia: f64,
    pub silhouette: f64,
    pub centroids: Vec<[f64; 2]>,
}

/// Output of [`cluster_rows`]
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Valid rows, in input order, each labelled
    pub rows: Vec<ClusteredRow>,
    /// Feature matrix (rows.len(), 2) in raw metric units
    pub features: Array2<f64>,
    /// `None` when there were fewer than two valid rows
    pub model: Option<ClusterModel>,
}

impl Clustering {
    pub fn summary(&self) -> Option<ClusterSummary> {
        self.model.as_ref().map(|m| m.summary(&self.features))
    }
}

/// Cluster rows along `(x, y)`, returning only the labelled rows.
pub fn cluster(rows: &[MergedRow], x: Metric, y: Metric) -> Vec<ClusteredRow> {
    cluster_rows(rows, x, y).rows
}

/// Cluster rows along `(x, y)`.
///
/// Rows missing either metric are dropped. With fewer than two remaining rows
/// every row is labelled [`UNCLUSTERED`]; otherwise K-Means runs with
/// `k = min(3, n)` on the unscaled values, so the metric with the larger range
/// dominates the partition.
pub fn cluster_rows(rows: &[MergedRow], x: Metric, y: Metric) -> Clustering {
    let valid: Vec<(&MergedRow, [f64; 2])> = rows
        .iter()
        .filter_map(|row| Some((row, [row.metric(x)?, row.metric(y)?])))
        .collect();

    let data: Vec<f64> = valid.iter().flat_map(|(_, point)| *point).collect();
    let features = Array2::from_shape_vec((valid.len(), 2), data)
        .unwrap_or_else(|_| Array2::zeros((0, 2)));

    if valid.len() < 2 {
        tracing::debug!(rows = valid.len(), %x, %y, "Too few rows to cluster");
        return Clustering {
            rows: valid
                .into_iter()
                .map(|(row, _)| ClusteredRow { row: row.clone(), cluster: UNCLUSTERED })
                .collect(),
            features,
            model: None,
        };
    }

    let model = fit_or_single(&features, MAX_CLUSTERS.min(valid.len()));

    let rows = valid
        .into_iter()
        .enumerate()
        .map(|(i, (row, _))| ClusteredRow {
            row: row.clone(),
            cluster: model.labels[i] as i32,
        })
        .collect();

    Clustering { rows, features, model: Some(model) }
}

/// [`fit_kmeans`], falling back to a single cluster if the fit fails.
fn fit_or_single(features: &Array2<f64>, n_clusters: usize) -> ClusterModel {
    fit_kmeans(features, n_clusters).unwrap_or_else(|err| {
        tracing::warn!(error = %err, n_clusters, "K-Means failed; assigning a single cluster");
        single_cluster(features)
    })
}

/// Every point in cluster 0, centered on the mean.
fn single_cluster(features: &Array2<f64>) -> ClusterModel {
    let labels = Array1::zeros(features.nrows());
    let centroids = features
        .mean_axis(Axis(0))
        .map(|mean| mean.insert_axis(Axis(0)))
        .unwrap_or_else(|| Array2::zeros((1, features.ncols())));
    let inertia = compute_inertia(features, &labels, &centroids);
    ClusterModel { n_clusters: 1, labels, centroids, inertia }
}

/// Fit seeded K-Means on an (n, 2) feature matrix.
///
/// When there are fewer distinct points than `n_clusters`, the cluster count is
/// reduced to the number of distinct points; a single distinct point yields one
/// cluster without running the algorithm.
///
/// Inputs whose squared spread would overflow are scaled down before fitting;
/// centroids are reported back in raw units.
pub fn fit_kmeans(features: &Array2<f64>, n_clusters: usize) -> crate::Result<ClusterModel> {
    if n_clusters == 0 {
        anyhow::bail!("Number of clusters must be positive");
    }
    if features.nrows() < n_clusters {
        anyhow::bail!(
            "Number of data points ({}) must be at least equal to number of clusters ({})",
            features.nrows(),
            n_clusters
        );
    }
    if features.iter().any(|v| !v.is_finite()) {
        anyhow::bail!("Features must be finite");
    }

    let scale = fit_scale(features);
    let scaled = if scale == 1.0 { features.clone() } else { features.mapv(|v| v * scale) };

    let n_clusters = n_clusters.min(count_distinct(&scaled));
    if n_clusters == 1 {
        return Ok(single_cluster(features));
    }

    let dataset = DatasetBase::from(scaled.clone());
    let rng = StdRng::seed_from_u64(KMEANS_SEED);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(N_RUNS)
        .max_n_iterations(MAX_ITERS)
        .tolerance(TOLERANCE)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(&scaled);
    let centroids = model.centroids().mapv(|c| c / scale);
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(ClusterModel { n_clusters, labels, centroids, inertia })
}

/// 1.0 unless summing squared spreads over every row would overflow.
fn fit_scale(features: &Array2<f64>) -> f64 {
    let spread_sq: f64 = features
        .axis_iter(Axis(1))
        .map(|column| {
            let (lo, hi) = column
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            (hi - lo).powi(2)
        })
        .sum();
    if (spread_sq * features.nrows() as f64).is_finite() {
        1.0
    } else {
        OVERFLOW_SCALE
    }
}

/// Number of points at a positive squared distance from every earlier kept point.
///
/// `0.0` and `-0.0` are one position, as are points whose squared distance
/// underflows to zero.
fn count_distinct(features: &Array2<f64>) -> usize {
    let mut positions: Vec<ArrayView1<f64>> = Vec::new();
    for point in features.outer_iter() {
        if positions.iter().all(|kept| squared_distance(kept, &point) > 0.0) {
            positions.push(point);
        }
    }
    positions.len()
}

fn squared_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| {
            let d = euclidean_distance(&features.row(i), &centroids.row(cluster));
            d * d
        })
        .sum()
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    squared_distance(point1, point2).sqrt()
}
