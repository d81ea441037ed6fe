//! Spearman rank correlation between features.
//!
//! Columns are converted to average ranks, centered and scaled to unit norm;
//! the correlation of two features is then the dot product of their scaled
//! rank vectors. Small inputs use a single dense matrix product, wide inputs
//! an explicit pairwise loop that avoids materializing intermediate products.

use crate::data::AbundanceMatrix;
use crate::stats::summary::average_ranks;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Feature count above which the pairwise loop replaces the dense product.
pub const PAIRWISE_FEATURE_THRESHOLD: usize = 1000;

/// Spearman coefficients and two-sided p-values over features.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    /// Feature IDs indexing rows and columns.
    pub ids: Vec<String>,
    pub rho: DMatrix<f64>,
    pub p_values: DMatrix<f64>,
    /// Number of samples the coefficients were computed on.
    pub n_samples: usize,
}

impl CorrelationMatrix {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check for an empty matrix.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Coefficient between features `i` and `j`.
    #[inline]
    pub fn rho(&self, i: usize, j: usize) -> f64 {
        self.rho[(i, j)]
    }

    /// P-value between features `i` and `j`.
    #[inline]
    pub fn p_value(&self, i: usize, j: usize) -> f64 {
        self.p_values[(i, j)]
    }
}

/// Full pairwise Spearman correlation between the columns of `matrix`.
///
/// The diagonal is 1 with p-value 0. Constant features have undefined
/// correlation with every other feature (NaN).
pub fn correlation_matrix(matrix: &AbundanceMatrix) -> CorrelationMatrix {
    let n_features = matrix.n_features();
    let strategy = if n_features > PAIRWISE_FEATURE_THRESHOLD {
        Strategy::Pairwise
    } else {
        Strategy::Dense
    };
    correlation_with_strategy(matrix, strategy)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Dense,
    Pairwise,
}

fn correlation_with_strategy(matrix: &AbundanceMatrix, strategy: Strategy) -> CorrelationMatrix {
    let n = matrix.n_samples();
    let p = matrix.n_features();
    let scaled = scaled_ranks(matrix.data());

    let mut rho = match strategy {
        Strategy::Dense => scaled.transpose() * &scaled,
        Strategy::Pairwise => pairwise_products(&scaled),
    };

    for i in 0..p {
        for j in 0..p {
            let v = rho[(i, j)];
            rho[(i, j)] = if i == j {
                1.0
            } else if v.is_finite() {
                v.clamp(-1.0, 1.0)
            } else {
                f64::NAN
            };
        }
    }

    let p_values = rho.map(|r| correlation_p_value(r, n));
    log::debug!(
        "Spearman correlation over {} features and {} samples ({:?})",
        p,
        n,
        strategy
    );

    CorrelationMatrix {
        ids: matrix.feature_ids().to_vec(),
        rho,
        p_values,
        n_samples: n,
    }
}

/// Rank each column, center it and scale it to unit norm.
/// Zero-variance columns become NaN.
fn scaled_ranks(data: &DMatrix<f64>) -> DMatrix<f64> {
    let n = data.nrows();
    let columns: Vec<DVector<f64>> = (0..data.ncols())
        .into_par_iter()
        .map(|j| {
            let values: Vec<f64> = data.column(j).iter().copied().collect();
            let ranks = average_ranks(&values);
            let mean = ranks.iter().sum::<f64>() / n.max(1) as f64;
            let centered: Vec<f64> = ranks.iter().map(|r| r - mean).collect();
            let norm = centered.iter().map(|c| c * c).sum::<f64>().sqrt();
            if norm > 0.0 {
                DVector::from_iterator(n, centered.into_iter().map(|c| c / norm))
            } else {
                DVector::from_element(n, f64::NAN)
            }
        })
        .collect();

    if columns.is_empty() {
        DMatrix::zeros(n, 0)
    } else {
        DMatrix::from_columns(&columns)
    }
}

fn pairwise_products(scaled: &DMatrix<f64>) -> DMatrix<f64> {
    let p = scaled.ncols();
    let upper: Vec<Vec<f64>> = (0..p)
        .into_par_iter()
        .map(|i| {
            let a = scaled.column(i);
            (i..p).map(|j| a.dot(&scaled.column(j))).collect()
        })
        .collect();

    let mut out = DMatrix::zeros(p, p);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &v) in row.iter().enumerate() {
            let j = i + offset;
            out[(i, j)] = v;
            out[(j, i)] = v;
        }
    }
    out
}

/// Spearman coefficient of two equally long vectors.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let rx = average_ranks(&x[..n]);
    let ry = average_ranks(&y[..n]);
    let mx = rx.iter().sum::<f64>() / n.max(1) as f64;
    let my = ry.iter().sum::<f64>() / n.max(1) as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in rx.iter().zip(&ry) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Two-sided p-value of a correlation coefficient with `n - 2` degrees of freedom.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if !r.is_finite() || n < 3 {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}
