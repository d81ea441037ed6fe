//! Principal coordinates analysis (classical multidimensional scaling).
//!
//! # Algorithm
//!
//! 1. Square the distances: A = D² (undefined distances count as 0)
//! 2. Double-center: B = -0.5 × (A - row_means - col_means + grand_mean)
//! 3. Symmetric eigendecomposition of B
//! 4. Sort eigenvalues descending, keep up to three positive ones
//! 5. Coordinates: X[i, k] = v_k[i] × √λ_k

use crate::distance::DistanceMatrix;
use crate::stats::summary::round_to;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Number of ordination axes reported.
pub const N_AXES: usize = 3;

/// Relative tolerance below which an eigenvalue counts as zero.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// PCoA result with a zero-filled 3-tuple per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcoaResult {
    pub ids: Vec<String>,
    pub coordinates: Vec<[f64; N_AXES]>,
    /// Percent of positive variance per axis, rounded to 2 places.
    pub variance_explained: [f64; N_AXES],
    /// Retained positive eigenvalues, descending.
    pub eigenvalues: Vec<f64>,
}

impl PcoaResult {
    /// First two axes of every sample.
    pub fn planar(&self) -> Vec<[f64; 2]> {
        self.coordinates.iter().map(|c| [c[0], c[1]]).collect()
    }
}

/// Run PCoA on a distance matrix.
///
/// Without any positive eigenvalue every coordinate and variance entry is zero.
pub fn pcoa(distances: &DistanceMatrix) -> PcoaResult {
    let n = distances.len();
    let ids = distances.ids.clone();
    let zero = || PcoaResult {
        ids: ids.clone(),
        coordinates: vec![[0.0; N_AXES]; n],
        variance_explained: [0.0; N_AXES],
        eigenvalues: Vec::new(),
    };
    if n < 2 {
        return zero();
    }

    let centered = double_center(&distances.finite_values());
    let eigen = SymmetricEigen::new(centered);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let largest = eigen
        .eigenvalues
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let tolerance = EIGEN_TOLERANCE * largest.max(f64::MIN_POSITIVE);
    let positive: Vec<usize> = order
        .into_iter()
        .filter(|&k| eigen.eigenvalues[k] > tolerance)
        .collect();
    if positive.is_empty() {
        log::debug!("PCoA found no positive eigenvalue for {} samples", n);
        return zero();
    }

    let positive_sum: f64 = positive.iter().map(|&k| eigen.eigenvalues[k]).sum();
    let mut coordinates = vec![[0.0; N_AXES]; n];
    let mut variance_explained = [0.0; N_AXES];
    let mut eigenvalues = Vec::with_capacity(N_AXES);

    for (axis, &k) in positive.iter().take(N_AXES).enumerate() {
        let lambda = eigen.eigenvalues[k];
        let vector = eigen.eigenvectors.column(k);
        let sign = axis_sign(vector.iter().copied());
        let scale = lambda.sqrt() * sign;
        for (sample, coord) in coordinates.iter_mut().enumerate() {
            coord[axis] = round_to(vector[sample] * scale, 6);
        }
        variance_explained[axis] = round_to(lambda / positive_sum * 100.0, 2);
        eigenvalues.push(lambda);
    }

    PcoaResult {
        ids,
        coordinates,
        variance_explained,
        eigenvalues,
    }
}

/// Gower double-centering of squared distances.
fn double_center(d: &DMatrix<f64>) -> DMatrix<f64> {
    let n = d.nrows();
    let n_f = n as f64;
    let sq = d.map(|v| v * v);
    let row_means: Vec<f64> = (0..n).map(|i| sq.row(i).sum() / n_f).collect();
    let grand_mean = row_means.iter().sum::<f64>() / n_f;

    DMatrix::from_fn(n, n, |i, j| {
        -0.5 * (sq[(i, j)] - row_means[i] - row_means[j] + grand_mean)
    })
}

/// +1 when the largest-magnitude component is positive, else -1.
fn axis_sign(components: impl Iterator<Item = f64>) -> f64 {
    let mut best = 0.0f64;
    for c in components {
        if c.abs() > best.abs() {
            best = c;
        }
    }
    if best < 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{distance_matrix, DistanceMetric};
    use crate::data::AbundanceMatrix;
    use approx::assert_relative_eq;

    fn from_values(values: DMatrix<f64>) -> DistanceMatrix {
        let n = values.nrows();
        DistanceMatrix {
            ids: (0..n).map(|i| format!("S{}", i)).collect(),
            values,
            metric: DistanceMetric::Euclidean,
            requested_metric: "euclidean".into(),
            substituted: false,
        }
    }

    #[test]
    fn test_identical_samples_zero_coordinates() {
        let result = pcoa(&from_values(DMatrix::zeros(3, 3)));
        assert_eq!(result.coordinates, vec![[0.0; 3]; 3]);
        assert_eq!(result.variance_explained, [0.0; 3]);
    }

    #[test]
    fn test_two_samples_single_axis() {
        let d = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let result = pcoa(&from_values(d));
        assert_eq!(result.eigenvalues.len(), 1);
        assert_eq!(result.variance_explained, [100.0, 0.0, 0.0]);
        let gap = (result.coordinates[0][0] - result.coordinates[1][0]).abs();
        assert_relative_eq!(gap, 1.0, epsilon = 1e-6);
        assert_eq!(result.coordinates[0][1], 0.0);
    }

    #[test]
    fn test_recovers_euclidean_configuration() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![3.0, 0.0],
            vec![0.0, 4.0],
            vec![3.0, 4.0],
            vec![1.0, 2.0],
        ];
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            (0..5).map(|i| format!("S{}", i)).collect(),
            vec!["x".into(), "y".into()],
        )
        .unwrap();
        let d = distance_matrix(&matrix, "euclidean");
        let result = pcoa(&d);
        assert_eq!(result.eigenvalues.len(), 2);
        let sum: f64 = result.variance_explained.iter().sum();
        assert_relative_eq!(sum, 100.0, epsilon = 0.02);
        // pairwise distances are preserved in the first two axes
        for i in 0..5 {
            for j in 0..5 {
                let a = result.coordinates[i];
                let b = result.coordinates[j];
                let dist = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
                assert_relative_eq!(dist, d.get(i, j), epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_axis_sign_fixed() {
        let d = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, 1.0, 3.0, 1.0, 0.0, 2.0, 3.0, 2.0, 0.0],
        );
        let result = pcoa(&from_values(d));
        let first: Vec<f64> = result.coordinates.iter().map(|c| c[0]).collect();
        let extreme = first
            .iter()
            .copied()
            .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        assert!(extreme > 0.0);
    }
}
