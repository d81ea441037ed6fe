//! Per-feature, per-class five-number summaries.

use super::summary::{quantile_sorted, round_to};
use crate::data::loader::resolve_feature_subset;
use crate::data::{AbundanceMatrix, ClassLabels};
use serde::{Deserialize, Serialize};

const BOX_PLACES: i32 = 6;

/// Options for boxplot summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxplotOptions {
    /// Maximum number of features summarized.
    pub max_features: usize,
    /// Only strictly positive values qualify.
    pub nonzero_only: bool,
}

impl Default for BoxplotOptions {
    fn default() -> Self {
        Self {
            max_features: 100,
            nonzero_only: false,
        }
    }
}

/// Five-number summary plus mean for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub class: i64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
    pub n: usize,
}

/// Boxplot summaries of one feature; classes without qualifying samples are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBoxplot {
    pub feature: String,
    pub classes: Vec<BoxStats>,
}

/// Features to display: the requested subset (in order) or, without one, the
/// features ranked by mean abundance. Capped to `max_features`.
pub(crate) fn select_display_features(
    matrix: &AbundanceMatrix,
    feature_subset: Option<&[String]>,
    max_features: usize,
) -> Vec<usize> {
    let mut selected = match feature_subset {
        Some(subset) => resolve_feature_subset(matrix, subset),
        None => Vec::new(),
    };
    if selected.is_empty() {
        let means = matrix.feature_means();
        selected = (0..matrix.n_features()).collect();
        selected.sort_by(|&a, &b| {
            means[b]
                .partial_cmp(&means[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
    }
    selected.truncate(max_features);
    selected
}

/// Summarize feature distributions per class.
pub fn boxplot_summary(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    feature_subset: Option<&[String]>,
    options: &BoxplotOptions,
) -> Vec<FeatureBoxplot> {
    let groups = labels.class_indices();
    let features = select_display_features(matrix, feature_subset, options.max_features);

    features
        .into_iter()
        .map(|j| {
            let column = matrix.data().column(j);
            let classes = groups
                .iter()
                .filter_map(|(&class, members)| {
                    let mut values: Vec<f64> = members
                        .iter()
                        .map(|&i| column[i])
                        .filter(|v| v.is_finite() && (!options.nonzero_only || *v > 0.0))
                        .collect();
                    if values.is_empty() {
                        return None;
                    }
                    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    Some(box_stats(class, &values))
                })
                .collect();
            FeatureBoxplot {
                feature: matrix.feature_ids()[j].clone(),
                classes,
            }
        })
        .collect()
}

fn box_stats(class: i64, sorted: &[f64]) -> BoxStats {
    let n = sorted.len();
    BoxStats {
        class,
        min: round_to(sorted[0], BOX_PLACES),
        q1: round_to(quantile_sorted(sorted, 0.25), BOX_PLACES),
        median: round_to(quantile_sorted(sorted, 0.5), BOX_PLACES),
        q3: round_to(quantile_sorted(sorted, 0.75), BOX_PLACES),
        max: round_to(sorted[n - 1], BOX_PLACES),
        mean: round_to(sorted.iter().sum::<f64>() / n as f64, BOX_PLACES),
        n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_data() -> (AbundanceMatrix, ClassLabels) {
        let rows = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
            vec![4.0, 0.0],
            vec![10.0, 5.0],
            vec![20.0, 7.0],
        ];
        let samples: Vec<String> = (0..6).map(|i| format!("S{}", i)).collect();
        let matrix =
            AbundanceMatrix::from_rows(&rows, samples.clone(), vec!["A".into(), "B".into()])
                .unwrap();
        let labels = ClassLabels::new(samples, vec![0, 0, 0, 0, 1, 1]).unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_quartiles_linear_interpolation() {
        let (matrix, labels) = create_test_data();
        let boxes = boxplot_summary(&matrix, &labels, Some(&["A".to_string()][..]), &BoxplotOptions::default());
        assert_eq!(boxes.len(), 1);
        let class0 = &boxes[0].classes[0];
        assert_eq!(class0.n, 4);
        assert_eq!(class0.q1, 1.75);
        assert_eq!(class0.median, 2.5);
        assert_eq!(class0.q3, 3.25);
        assert_eq!(class0.mean, 2.5);
    }

    #[test]
    fn test_empty_class_omitted() {
        let (matrix, labels) = create_test_data();
        let options = BoxplotOptions {
            nonzero_only: true,
            ..Default::default()
        };
        let boxes = boxplot_summary(&matrix, &labels, Some(&["B".to_string()][..]), &options);
        assert_eq!(boxes[0].classes.len(), 1);
        assert_eq!(boxes[0].classes[0].class, 1);
    }

    #[test]
    fn test_default_selection_by_mean_and_cap() {
        let (matrix, labels) = create_test_data();
        let options = BoxplotOptions {
            max_features: 1,
            ..Default::default()
        };
        let boxes = boxplot_summary(&matrix, &labels, None, &options);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].feature, "A");
    }
}
