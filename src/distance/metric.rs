//! Pairwise ecological distances between samples.

use crate::data::AbundanceMatrix;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Σ|a - b| / Σ(a + b)
    BrayCurtis,
    Euclidean,
    /// Sum of absolute differences (city block).
    Manhattan,
    /// Presence/absence Jaccard distance (values > 0 are present).
    Jaccard,
    /// 1 - cos(a, b)
    Cosine,
}

impl DistanceMetric {
    /// Parse a metric name; common spellings are accepted.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "braycurtis" | "bray" => Some(Self::BrayCurtis),
            "euclidean" => Some(Self::Euclidean),
            "manhattan" | "cityblock" => Some(Self::Manhattan),
            "jaccard" => Some(Self::Jaccard),
            "cosine" => Some(Self::Cosine),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BrayCurtis => "braycurtis",
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Jaccard => "jaccard",
            Self::Cosine => "cosine",
        }
    }

    /// Distance between two equally long vectors. NaN when undefined.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::BrayCurtis => bray_curtis(a, b),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt(),
            Self::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            Self::Jaccard => jaccard(a, b),
            Self::Cosine => cosine(a, b),
        }
    }
}

/// Bray-Curtis dissimilarity; NaN when both samples sum to zero.
pub fn bray_curtis(a: &[f64], b: &[f64]) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        numerator += (x - y).abs();
        denominator += (x + y).abs();
    }
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Presence/absence Jaccard distance; 0 when neither sample has any feature.
pub fn jaccard(a: &[f64], b: &[f64]) -> f64 {
    let mut union = 0usize;
    let mut differ = 0usize;
    for (&x, &y) in a.iter().zip(b) {
        let (px, py) = (x > 0.0, y > 0.0);
        if px || py {
            union += 1;
            if px != py {
                differ += 1;
            }
        }
    }
    if union == 0 {
        0.0
    } else {
        differ as f64 / union as f64
    }
}

/// Cosine distance; NaN when either vector has zero norm.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        f64::NAN
    } else {
        (1.0 - dot / (na * nb)).max(0.0)
    }
}

/// Square, symmetric, zero-diagonal distance matrix over samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    /// Sample IDs indexing rows and columns.
    pub ids: Vec<String>,
    pub values: DMatrix<f64>,
    /// Metric actually used.
    pub metric: DistanceMetric,
    /// Metric name requested by the caller.
    pub requested_metric: String,
    /// True when the requested metric was replaced by Euclidean.
    pub substituted: bool,
}

/// Serializable view of a distance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrixPayload {
    pub ids: Vec<String>,
    pub metric: DistanceMetric,
    pub requested_metric: String,
    pub substituted: bool,
    /// Row-major values; undefined entries serialize as null.
    pub values: Vec<Vec<Option<f64>>>,
}

impl DistanceMatrix {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check for an empty matrix.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Distance between samples `i` and `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[(i, j)]
    }

    /// Copy with non-finite entries replaced by zero.
    pub fn finite_values(&self) -> DMatrix<f64> {
        self.values.map(|v| if v.is_finite() { v } else { 0.0 })
    }

    /// Convert to a plain nested payload, rounding to `places` decimals.
    pub fn to_payload(&self, places: i32) -> DistanceMatrixPayload {
        let n = self.len();
        DistanceMatrixPayload {
            ids: self.ids.clone(),
            metric: self.metric,
            requested_metric: self.requested_metric.clone(),
            substituted: self.substituted,
            values: (0..n)
                .map(|i| {
                    (0..n)
                        .map(|j| {
                            let v = self.values[(i, j)];
                            v.is_finite().then(|| crate::stats::summary::round_to(v, places))
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

/// Compute the pairwise distance matrix between samples.
///
/// Unknown metric names, and metrics that yield no finite distance at all,
/// fall back to Euclidean; the substitution is recorded, never raised.
pub fn distance_matrix(matrix: &AbundanceMatrix, metric: &str) -> DistanceMatrix {
    let rows = matrix.sample_rows();
    let ids = matrix.sample_ids().to_vec();

    let (chosen, mut substituted) = match DistanceMetric::parse(metric) {
        Some(m) => (m, false),
        None => {
            log::warn!("Unsupported distance metric '{}', using euclidean", metric);
            (DistanceMetric::Euclidean, true)
        }
    };

    let mut values = pairwise(&rows, chosen);
    let mut used = chosen;
    if chosen != DistanceMetric::Euclidean && rows.len() > 1 && all_off_diagonal_undefined(&values)
    {
        log::warn!(
            "Distance metric '{}' undefined for every sample pair, using euclidean",
            chosen.name()
        );
        values = pairwise(&rows, DistanceMetric::Euclidean);
        used = DistanceMetric::Euclidean;
        substituted = true;
    }

    DistanceMatrix {
        ids,
        values,
        metric: used,
        requested_metric: metric.to_string(),
        substituted,
    }
}

/// Pairwise distances over arbitrary row vectors.
pub fn pairwise(rows: &[Vec<f64>], metric: DistanceMetric) -> DMatrix<f64> {
    let n = rows.len();
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| metric.distance(&rows[i], &rows[j]))
                .collect()
        })
        .collect();

    let mut values = DMatrix::zeros(n, n);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &d) in row.iter().enumerate() {
            let j = i + 1 + offset;
            values[(i, j)] = d;
            values[(j, i)] = d;
        }
    }
    values
}

fn all_off_diagonal_undefined(values: &DMatrix<f64>) -> bool {
    let n = values.nrows();
    (0..n).all(|i| ((i + 1)..n).all(|j| !values[(i, j)].is_finite()))
}
