//! Loading and aligning an abundance matrix with its class labels.

use super::{AbundanceMatrix, ClassLabels};
use super::group_by_class;
use crate::error::{ExploreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Options controlling how a matrix/label pair is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Rows of the matrix file are features (columns are samples).
    #[serde(default)]
    pub features_in_rows: bool,
    /// Restrict to these features. An empty intersection keeps every feature.
    #[serde(default)]
    pub feature_subset: Option<Vec<String>>,
    /// Keep only samples carrying this class code.
    #[serde(default)]
    pub class_filter: Option<i64>,
    /// Stratified downsampling cap on the number of samples.
    #[serde(default)]
    pub max_samples: Option<usize>,
}

/// Load a matrix and labels from disk and align them.
pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
    x_path: P,
    y_path: Q,
    options: &LoadOptions,
) -> Result<(AbundanceMatrix, ClassLabels)> {
    let matrix = AbundanceMatrix::from_delimited(x_path.as_ref(), options.features_in_rows)?;
    let labels = ClassLabels::from_delimited(y_path.as_ref())?;
    log::debug!(
        "Loaded {} samples x {} features and {} labels",
        matrix.n_samples(),
        matrix.n_features(),
        labels.len()
    );
    align(&matrix, &labels, options)
}

/// Align an in-memory matrix with labels and apply the loading options.
///
/// Samples present in only one of the two inputs are dropped silently; an
/// empty intersection is an error.
pub fn align(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    options: &LoadOptions,
) -> Result<(AbundanceMatrix, ClassLabels)> {
    // Keep matrix sample order for the common samples.
    let mut sample_rows = Vec::new();
    let mut classes = Vec::new();
    for (i, id) in matrix.sample_ids().iter().enumerate() {
        if let Some(class) = labels.get(id) {
            if options.class_filter.map_or(true, |c| c == class) {
                sample_rows.push(i);
                classes.push(class);
            }
        }
    }

    if sample_rows.is_empty() {
        if let Some(class) = options.class_filter {
            return Err(ExploreError::EmptyData(format!(
                "No aligned samples carry class {}",
                class
            )));
        }
        return Err(ExploreError::AlignmentEmpty {
            matrix_samples: matrix.n_samples(),
            label_samples: labels.len(),
        });
    }

    if let Some(cap) = options.max_samples {
        let keep = stratified_indices(&classes, cap);
        sample_rows = keep.iter().map(|&k| sample_rows[k]).collect();
        classes = keep.iter().map(|&k| classes[k]).collect();
    }

    let mut aligned = matrix.subset_samples(&sample_rows)?;
    if let Some(subset) = &options.feature_subset {
        let columns = resolve_feature_subset(&aligned, subset);
        if columns.is_empty() {
            log::debug!(
                "Feature subset of {} names matched nothing; keeping all {} features",
                subset.len(),
                aligned.n_features()
            );
        } else {
            aligned = aligned.subset_features(&columns)?;
        }
    }

    let aligned_labels = ClassLabels::new(aligned.sample_ids().to_vec(), classes)?;
    Ok((aligned, aligned_labels))
}

/// Column positions of the requested features that exist, in request order.
pub fn resolve_feature_subset(matrix: &AbundanceMatrix, subset: &[String]) -> Vec<usize> {
    let mut seen = HashSet::new();
    subset
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .filter_map(|name| matrix.feature_index(name))
        .collect()
}

/// Deterministic stratified downsampling.
///
/// Each class receives a quota proportional to its share of the cap (floored,
/// with at least one sample per class when the cap allows it; a cap below the
/// class count goes to the largest classes). Within a class,
/// samples are taken at a fixed stride through the class's sample list.
/// Returned positions are ascending.
pub fn stratified_indices(classes: &[i64], max_samples: usize) -> Vec<usize> {
    let total = classes.len();
    if max_samples >= total {
        return (0..total).collect();
    }

    let groups = group_by_class(classes);
    let n_classes = groups.len();
    let mut quotas: Vec<usize> = groups
        .values()
        .map(|members| {
            let mut quota = max_samples * members.len() / total;
            if max_samples >= n_classes {
                quota = quota.max(1);
            }
            quota.min(members.len())
        })
        .collect();

    // The one-per-class floor can overshoot the cap; take back from the largest quotas.
    while quotas.iter().sum::<usize>() > max_samples {
        let largest = quotas
            .iter()
            .enumerate()
            .filter(|&(_, &q)| q > 1)
            .max_by_key(|&(i, &q)| (q, std::cmp::Reverse(i)))
            .map(|(i, _)| i);
        match largest {
            Some(i) => quotas[i] -= 1,
            None => break,
        }
    }

    // Below one sample per class the floors can all be zero; the leftover cap goes
    // to unrepresented classes first, largest first.
    if max_samples < n_classes {
        let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
        let mut by_size: Vec<usize> = (0..n_classes).collect();
        by_size.sort_by_key(|&i| (quotas[i] > 0, std::cmp::Reverse(sizes[i]), i));
        let mut leftover = max_samples.saturating_sub(quotas.iter().sum());
        for i in by_size {
            if leftover == 0 {
                break;
            }
            if quotas[i] < sizes[i] {
                quotas[i] += 1;
                leftover -= 1;
            }
        }
    }

    let mut selected = Vec::with_capacity(max_samples);
    for (members, &quota) in groups.values().zip(&quotas) {
        let len = members.len();
        for i in 0..quota {
            selected.push(members[i * len / quota]);
        }
    }
    selected.sort_unstable();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_data() -> (AbundanceMatrix, ClassLabels) {
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, 1.0, 0.0]).collect();
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            (0..6).map(|i| format!("S{}", i)).collect(),
            vec!["A".into(), "B".into(), "C".into()],
        )
        .unwrap();
        // S0 has no label, S9 is not in the matrix.
        let labels = ClassLabels::new(
            vec![
                "S9".into(),
                "S5".into(),
                "S1".into(),
                "S2".into(),
                "S3".into(),
                "S4".into(),
            ],
            vec![1, 1, 0, 0, 1, 0],
        )
        .unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_align_intersects_samples() {
        let (matrix, labels) = create_test_data();
        let (m, l) = align(&matrix, &labels, &LoadOptions::default()).unwrap();
        assert_eq!(m.sample_ids(), &["S1", "S2", "S3", "S4", "S5"]);
        assert_eq!(l.classes(), &[0, 0, 1, 0, 1]);
        assert_eq!(m.get(0, 0), 1.0);
    }

    #[test]
    fn test_align_empty_is_error() {
        let (matrix, _) = create_test_data();
        let labels = ClassLabels::new(vec!["X".into()], vec![0]).unwrap();
        let result = align(&matrix, &labels, &LoadOptions::default());
        assert!(matches!(result, Err(ExploreError::AlignmentEmpty { .. })));
    }

    #[test]
    fn test_feature_subset_fail_open() {
        let (matrix, labels) = create_test_data();
        let options = LoadOptions {
            feature_subset: Some(vec!["nope".into()]),
            ..Default::default()
        };
        let (m, _) = align(&matrix, &labels, &options).unwrap();
        assert_eq!(m.n_features(), 3);

        let options = LoadOptions {
            feature_subset: Some(vec!["C".into(), "nope".into(), "A".into()]),
            ..Default::default()
        };
        let (m, _) = align(&matrix, &labels, &options).unwrap();
        assert_eq!(m.feature_ids(), &["C", "A"]);
    }

    #[test]
    fn test_class_filter() {
        let (matrix, labels) = create_test_data();
        let options = LoadOptions {
            class_filter: Some(1),
            ..Default::default()
        };
        let (m, l) = align(&matrix, &labels, &options).unwrap();
        assert_eq!(m.sample_ids(), &["S3", "S5"]);
        assert!(l.classes().iter().all(|&c| c == 1));
    }

    #[test]
    fn test_stratified_indices_proportional() {
        // 60 of class 0, 40 of class 1
        let classes: Vec<i64> = (0..100).map(|i| if i < 60 { 0 } else { 1 }).collect();
        let keep = stratified_indices(&classes, 10);
        assert_eq!(keep.len(), 10);
        let n0 = keep.iter().filter(|&&i| classes[i] == 0).count();
        assert_eq!(n0, 6);
        // Fixed stride through class 0: positions 0, 10, 20, ...
        assert_eq!(&keep[..3], &[0, 10, 20]);
    }

    #[test]
    fn test_stratified_indices_deterministic_and_capped() {
        let classes: Vec<i64> = (0..102)
            .map(|i| match i {
                0 => 1,
                1 => 2,
                _ => 0,
            })
            .collect();
        let a = stratified_indices(&classes, 3);
        let b = stratified_indices(&classes, 3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        // Every class represented
        assert!(a.contains(&0));
        assert!(a.contains(&1));
    }

    #[test]
    fn test_stratified_cap_below_class_count() {
        // 3 classes of 10: every proportional quota floors to zero
        let classes: Vec<i64> = (0..30).map(|i| i / 10).collect();
        assert_eq!(stratified_indices(&classes, 2), vec![0, 10]);
        assert_eq!(stratified_indices(&classes, 1), vec![0]);
        assert!(stratified_indices(&classes, 0).is_empty());

        // Larger classes are served first
        let classes = vec![0, 1, 1, 1, 2, 2];
        assert_eq!(stratified_indices(&classes, 2), vec![1, 4]);
    }

    #[test]
    fn test_stratified_no_downsampling_below_cap() {
        let classes = vec![0, 1, 0];
        assert_eq!(stratified_indices(&classes, 10), vec![0, 1, 2]);
    }
}
