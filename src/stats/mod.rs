//! Feature statistics: descriptive records, histograms, boxplots and barcodes.

mod barcode;
mod boxplot;
mod descriptive;
mod histogram;
pub mod summary;

pub use barcode::{barcode_matrix, BarcodeMatrix, BarcodeOptions};
pub use boxplot::{boxplot_summary, BoxStats, BoxplotOptions, FeatureBoxplot};
pub use descriptive::{descriptive_stats, ClassSummary, Enrichment, FeatureRecord};
pub use histogram::{histogram, prevalence_histogram, Histogram};

use crate::data::{AbundanceMatrix, ClassLabels};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for the feature statistics payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsParams {
    /// Significance level for enrichment calls.
    pub alpha: f64,
    /// Bin count of the prevalence and standard deviation histograms.
    pub histogram_bins: usize,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            histogram_bins: 20,
        }
    }
}

/// Full statistics payload for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatistics {
    pub n_samples: usize,
    pub n_features: usize,
    /// Samples per class code.
    pub class_counts: BTreeMap<i64, usize>,
    pub records: Vec<FeatureRecord>,
    /// Prevalence in percent over [0, 100].
    pub prevalence_histogram: Histogram,
    pub std_histogram: Histogram,
}

/// Compute records and summary histograms.
pub fn feature_statistics(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    params: &StatsParams,
) -> FeatureStatistics {
    let records = descriptive_stats(matrix, labels, params.alpha);
    let prevalence: Vec<f64> = records.iter().map(|r| r.prevalence).collect();
    let stds: Vec<f64> = records.iter().map(|r| r.std).collect();

    FeatureStatistics {
        n_samples: matrix.n_samples(),
        n_features: matrix.n_features(),
        class_counts: labels
            .class_indices()
            .into_iter()
            .map(|(c, m)| (c, m.len()))
            .collect(),
        prevalence_histogram: prevalence_histogram(&prevalence, params.histogram_bins),
        std_histogram: histogram(&stds, params.histogram_bins, None),
        records,
    }
}
