//! Ordination and group-separation inference.
//!
//! [`ordinate`] composes the full workflow: distance matrix, PCoA, per-class
//! confidence ellipses on the first two axes and a PERMANOVA on the same
//! distances.

mod ellipse;
mod pcoa;
mod permanova;

pub use ellipse::{confidence_ellipses, ConfidenceEllipse, ELLIPSE_POINTS};
pub use pcoa::{pcoa, PcoaResult, N_AXES};
pub use permanova::{permanova, PermanovaConfig, PermanovaResult};

use crate::data::{AbundanceMatrix, ClassLabels};
use crate::distance::{distance_matrix, DistanceMetric};
use crate::error::{ExploreError, Result};
use serde::{Deserialize, Serialize};

/// Parameters of an ordination request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdinationParams {
    /// Distance metric name; unsupported names fall back to Euclidean.
    pub metric: String,
    pub n_permutations: usize,
    /// Confidence level of the class ellipses.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for OrdinationParams {
    fn default() -> Self {
        Self {
            metric: "braycurtis".to_string(),
            n_permutations: 999,
            confidence: 0.95,
            seed: 42,
        }
    }
}

impl OrdinationParams {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ExploreError::InvalidParameter(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Position of one sample in ordination space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinationPoint {
    pub sample: String,
    pub class: i64,
    pub coordinates: [f64; N_AXES],
}

/// Complete ordination payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinationResult {
    pub points: Vec<OrdinationPoint>,
    pub variance_explained: [f64; N_AXES],
    pub ellipses: Vec<ConfidenceEllipse>,
    pub permanova: PermanovaResult,
    /// Metric actually used.
    pub metric: DistanceMetric,
    pub requested_metric: String,
    pub metric_substituted: bool,
}

/// Run distance → PCoA → ellipses → PERMANOVA on aligned data.
pub fn ordinate(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    params: &OrdinationParams,
) -> Result<OrdinationResult> {
    params.validate()?;
    if labels.len() != matrix.n_samples() {
        return Err(ExploreError::DimensionMismatch {
            expected: matrix.n_samples(),
            actual: labels.len(),
        });
    }

    let distances = distance_matrix(matrix, &params.metric);
    let ordination = pcoa(&distances);
    let ellipses = confidence_ellipses(&ordination.planar(), labels.classes(), params.confidence);
    let test = permanova(
        &distances,
        labels.classes(),
        &PermanovaConfig {
            n_permutations: params.n_permutations,
            seed: params.seed,
            parallel: true,
        },
    );

    log::info!(
        "Ordination of {} samples ({}): F={}, p={}",
        matrix.n_samples(),
        distances.metric.name(),
        test.f_statistic,
        test.p_value
    );

    let points = ordination
        .coordinates
        .iter()
        .zip(matrix.sample_ids())
        .zip(labels.classes())
        .map(|((&coordinates, sample), &class)| OrdinationPoint {
            sample: sample.clone(),
            class,
            coordinates,
        })
        .collect();

    Ok(OrdinationResult {
        points,
        variance_explained: ordination.variance_explained,
        ellipses,
        permanova: test,
        metric: distances.metric,
        requested_metric: distances.requested_metric,
        metric_substituted: distances.substituted,
    })
}
