//! Class-ordered "barcode" matrices (features × samples).

use super::boxplot::select_display_features;
use super::summary::round_to;
use crate::data::{stratified_indices, AbundanceMatrix, ClassLabels};
use serde::{Deserialize, Serialize};

/// Options for barcode matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeOptions {
    pub max_features: usize,
    pub max_samples: usize,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            max_features: 100,
            max_samples: 500,
        }
    }
}

/// Feature × sample matrix with samples grouped by class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeMatrix {
    pub features: Vec<String>,
    /// Sample order of the columns (sorted by class, stable).
    pub samples: Vec<String>,
    pub sample_classes: Vec<i64>,
    /// Rows are features, columns follow `samples`.
    pub values: Vec<Vec<f64>>,
    /// Cumulative sample counts where each class block ends (one fewer than the classes).
    pub class_boundaries: Vec<usize>,
    /// Number of samples before downsampling.
    pub total_samples: usize,
}

/// Build a barcode matrix, downsampling with the stratified fixed stride if needed.
pub fn barcode_matrix(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    feature_subset: Option<&[String]>,
    options: &BarcodeOptions,
) -> BarcodeMatrix {
    let features = select_display_features(matrix, feature_subset, options.max_features);

    let mut order = stratified_indices(labels.classes(), options.max_samples);
    order.sort_by_key(|&i| labels.classes()[i]);

    let sample_classes: Vec<i64> = order.iter().map(|&i| labels.classes()[i]).collect();
    let class_boundaries: Vec<usize> = sample_classes
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] != w[1])
        .map(|(i, _)| i + 1)
        .collect();

    let values = features
        .iter()
        .map(|&j| {
            order
                .iter()
                .map(|&i| round_to(matrix.get(i, j), 6))
                .collect()
        })
        .collect();

    BarcodeMatrix {
        features: features
            .iter()
            .map(|&j| matrix.feature_ids()[j].clone())
            .collect(),
        samples: order
            .iter()
            .map(|&i| matrix.sample_ids()[i].clone())
            .collect(),
        sample_classes,
        values,
        class_boundaries,
        total_samples: matrix.n_samples(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_data(n: usize) -> (AbundanceMatrix, ClassLabels) {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, 1.0]).collect();
        let samples: Vec<String> = (0..n).map(|i| format!("S{}", i)).collect();
        let matrix =
            AbundanceMatrix::from_rows(&rows, samples.clone(), vec!["A".into(), "B".into()])
                .unwrap();
        // interleaved classes, 1/3 class 1
        let labels =
            ClassLabels::new(samples, (0..n).map(|i| (i % 3 == 0) as i64).collect()).unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_sorted_by_class_with_boundaries() {
        let (matrix, labels) = create_test_data(6);
        let barcode = barcode_matrix(&matrix, &labels, None, &BarcodeOptions::default());
        assert_eq!(barcode.sample_classes, vec![0, 0, 0, 0, 1, 1]);
        assert_eq!(barcode.class_boundaries, vec![4]);
        assert_eq!(barcode.samples[4], "S0");
        assert_eq!(barcode.values.len(), 2);
        assert_eq!(barcode.values[0].len(), 6);
    }

    #[test]
    fn test_downsampling_keeps_proportions() {
        let (matrix, labels) = create_test_data(300);
        let options = BarcodeOptions {
            max_samples: 30,
            ..Default::default()
        };
        let barcode = barcode_matrix(&matrix, &labels, None, &options);
        assert!(barcode.samples.len() <= 30);
        let n1 = barcode.sample_classes.iter().filter(|&&c| c == 1).count();
        // 100 of 300 samples are class 1
        assert!((n1 as f64 / barcode.samples.len() as f64 - 1.0 / 3.0).abs() < 0.05);
        assert_eq!(barcode.total_samples, 300);
    }

    #[test]
    fn test_boundaries_for_three_classes() {
        let rows: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let samples: Vec<String> = (0..5).map(|i| format!("S{}", i)).collect();
        let matrix = AbundanceMatrix::from_rows(&rows, samples.clone(), vec!["A".into()]).unwrap();
        let labels = ClassLabels::new(samples, vec![2, 0, 1, 0, 2]).unwrap();
        let barcode = barcode_matrix(&matrix, &labels, None, &BarcodeOptions::default());
        assert_eq!(barcode.sample_classes, vec![0, 0, 1, 2, 2]);
        assert_eq!(barcode.class_boundaries, vec![2, 3]);
    }
}
