//! Per-feature descriptive statistics and class enrichment.

use super::summary::{average_ranks, mean, prevalence, round_to, sample_std, tie_group_sizes};
use crate::data::{AbundanceMatrix, ClassLabels};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use std::collections::BTreeMap;

/// Decimal places for returned statistics.
const STAT_PLACES: i32 = 6;

/// Enrichment call for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Enrichment {
    /// Significantly higher in the given class.
    Enriched { class: i64 },
    /// No significant difference (or not testable).
    NotSignificant,
}

impl Enrichment {
    /// Class the feature is enriched in, if any.
    pub fn class(&self) -> Option<i64> {
        match self {
            Self::Enriched { class } => Some(*class),
            Self::NotSignificant => None,
        }
    }
}

/// Statistics of one feature within one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class: i64,
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub prevalence: f64,
}

/// Descriptive record for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    /// Fraction of samples with a value > 0, in [0, 1].
    pub prevalence: f64,
    pub per_class: Vec<ClassSummary>,
    /// Rank-test p-value; absent with fewer than two classes.
    pub p_value: Option<f64>,
    pub enrichment: Enrichment,
}

/// Compute one record per feature of the aligned matrix.
///
/// Significance uses a Mann-Whitney U test for two classes and a
/// Kruskal-Wallis H test for three or more. A feature is called enriched in
/// the class with the highest mean rank when `p < alpha`.
pub fn descriptive_stats(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    alpha: f64,
) -> Vec<FeatureRecord> {
    let groups = labels.class_indices();

    (0..matrix.n_features())
        .into_par_iter()
        .map(|j| {
            let values = matrix.feature_values(j);
            feature_record(&matrix.feature_ids()[j], &values, &groups, alpha)
        })
        .collect()
}

fn feature_record(
    name: &str,
    values: &[f64],
    groups: &BTreeMap<i64, Vec<usize>>,
    alpha: f64,
) -> FeatureRecord {
    let per_class: Vec<ClassSummary> = groups
        .iter()
        .map(|(&class, members)| {
            let class_values: Vec<f64> = members.iter().map(|&i| values[i]).collect();
            ClassSummary {
                class,
                n: class_values.len(),
                mean: round_to(mean(&class_values), STAT_PLACES),
                std: round_to(sample_std(&class_values), STAT_PLACES),
                prevalence: round_to(prevalence(&class_values), STAT_PLACES),
            }
        })
        .collect();

    let test = rank_test(values, groups);
    let enrichment = match test {
        Some(RankTest { p_value, top_class }) if p_value < alpha => Enrichment::Enriched {
            class: top_class,
        },
        _ => Enrichment::NotSignificant,
    };

    FeatureRecord {
        name: name.to_string(),
        mean: round_to(mean(values), STAT_PLACES),
        std: round_to(sample_std(values), STAT_PLACES),
        prevalence: round_to(prevalence(values), STAT_PLACES),
        per_class,
        p_value: test.map(|t| round_to(t.p_value, STAT_PLACES)),
        enrichment,
    }
}

#[derive(Debug, Clone, Copy)]
struct RankTest {
    p_value: f64,
    /// Class with the highest mean rank.
    top_class: i64,
}

/// Rank-based test across classes; `None` when fewer than two non-empty classes.
fn rank_test(values: &[f64], groups: &BTreeMap<i64, Vec<usize>>) -> Option<RankTest> {
    let non_empty: Vec<(i64, &Vec<usize>)> = groups
        .iter()
        .filter(|(_, m)| !m.is_empty())
        .map(|(&c, m)| (c, m))
        .collect();
    if non_empty.len() < 2 {
        return None;
    }

    let ranks = average_ranks(values);
    let rank_sums: Vec<f64> = non_empty
        .iter()
        .map(|(_, m)| m.iter().map(|&i| ranks[i]).sum())
        .collect();

    let top_class = non_empty
        .iter()
        .zip(&rank_sums)
        .map(|((c, m), &r)| (*c, r / m.len() as f64))
        .fold(None, |best: Option<(i64, f64)>, (c, mr)| match best {
            Some((_, b)) if b >= mr => best,
            _ => Some((c, mr)),
        })
        .map(|(c, _)| c)?;

    let ties = tie_group_sizes(values);
    let p_value = if non_empty.len() == 2 {
        mann_whitney_p(
            rank_sums[0],
            non_empty[0].1.len(),
            non_empty[1].1.len(),
            &ties,
        )
    } else {
        let sizes: Vec<usize> = non_empty.iter().map(|(_, m)| m.len()).collect();
        kruskal_wallis_p(&rank_sums, &sizes, &ties)
    };

    Some(RankTest { p_value, top_class })
}

/// Two-sided Mann-Whitney U p-value (normal approximation, tie and continuity corrected).
fn mann_whitney_p(rank_sum_1: f64, n1: usize, n2: usize, ties: &[usize]) -> f64 {
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let n = n1f + n2f;
    let u1 = rank_sum_1 - n1f * (n1f + 1.0) / 2.0;
    let mu = n1f * n2f / 2.0;

    let tie_term: f64 = ties.iter().map(|&t| (t as f64).powi(3) - t as f64).sum();
    let variance = n1f * n2f / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if !(variance > 0.0) {
        return 1.0;
    }

    let z = ((u1 - mu).abs() - 0.5).max(0.0) / variance.sqrt();
    match Normal::new(0.0, 1.0) {
        Ok(normal) => (2.0 * (1.0 - normal.cdf(z))).min(1.0),
        Err(_) => 1.0,
    }
}

/// Kruskal-Wallis H p-value (chi-squared approximation, tie corrected).
fn kruskal_wallis_p(rank_sums: &[f64], sizes: &[usize], ties: &[usize]) -> f64 {
    let n: f64 = sizes.iter().sum::<usize>() as f64;
    let h: f64 = 12.0 / (n * (n + 1.0))
        * rank_sums
            .iter()
            .zip(sizes)
            .map(|(&r, &s)| r * r / s as f64)
            .sum::<f64>()
        - 3.0 * (n + 1.0);

    let tie_term: f64 = ties.iter().map(|&t| (t as f64).powi(3) - t as f64).sum();
    let correction = 1.0 - tie_term / (n.powi(3) - n);
    if !(correction > 0.0) {
        return 1.0;
    }

    let df = (sizes.len() - 1) as f64;
    match ChiSquared::new(df) {
        Ok(chi2) => (1.0 - chi2.cdf((h / correction).max(0.0))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_data() -> (AbundanceMatrix, ClassLabels) {
        // 10 samples: 5 per class
        // F0 strongly higher in class 1, F1 identical, F2 absent in class 0
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let case = i >= 5;
                vec![
                    if case { 50.0 + i as f64 } else { i as f64 },
                    1.0,
                    if case { 3.0 } else { 0.0 },
                ]
            })
            .collect();
        let samples: Vec<String> = (0..10).map(|i| format!("S{}", i)).collect();
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            samples.clone(),
            vec!["F0".into(), "F1".into(), "F2".into()],
        )
        .unwrap();
        let labels = ClassLabels::new(samples, (0..10).map(|i| (i >= 5) as i64).collect()).unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_one_record_per_feature() {
        let (matrix, labels) = create_test_data();
        let records = descriptive_stats(&matrix, &labels, 0.05);
        assert_eq!(records.len(), matrix.n_features());
        for r in &records {
            assert!((0.0..=1.0).contains(&r.prevalence));
            assert_eq!(r.per_class.len(), 2);
        }
    }

    #[test]
    fn test_enrichment_calls() {
        let (matrix, labels) = create_test_data();
        let records = descriptive_stats(&matrix, &labels, 0.05);

        assert_eq!(records[0].enrichment, Enrichment::Enriched { class: 1 });
        assert!(records[0].p_value.unwrap() < 0.05);

        // Constant feature: no evidence
        assert_eq!(records[1].enrichment, Enrichment::NotSignificant);
        assert_eq!(records[1].p_value, Some(1.0));

        assert_eq!(records[2].enrichment.class(), Some(1));
        assert_eq!(records[2].per_class[0].prevalence, 0.0);
        assert_eq!(records[2].per_class[1].prevalence, 1.0);
        assert_eq!(records[2].prevalence, 0.5);
    }

    #[test]
    fn test_single_class_not_tested() {
        let (matrix, _) = create_test_data();
        let labels = ClassLabels::new(matrix.sample_ids().to_vec(), vec![0; 10]).unwrap();
        let records = descriptive_stats(&matrix, &labels, 0.05);
        assert!(records.iter().all(|r| r.p_value.is_none()));
        assert!(records.iter().all(|r| r.enrichment == Enrichment::NotSignificant));
    }

    #[test]
    fn test_three_classes_kruskal() {
        let values: Vec<f64> = (0..12).map(|i| (i / 4) as f64 * 10.0 + (i % 4) as f64).collect();
        let classes: Vec<i64> = (0..12).map(|i| (i / 4) as i64).collect();
        let groups = crate::data::group_by_class(&classes);
        let test = rank_test(&values, &groups).unwrap();
        assert_eq!(test.top_class, 2);
        assert!(test.p_value < 0.05);
    }

    #[test]
    fn test_mann_whitney_known_value() {
        // x = [1,2,3], y = [4,5,6]: U = 0, z = (4.5 - 0.5)/sqrt(5.25)
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ranks = average_ranks(&values);
        let r1: f64 = ranks[..3].iter().sum();
        let p = mann_whitney_p(r1, 3, 3, &[]);
        assert!((p - 0.0809).abs() < 1e-3, "p = {}", p);
    }
}
