//! PERMANOVA: permutation test of group separation on a distance matrix.
//!
//! # Algorithm
//!
//! 1. Compute the observed pseudo-F from between- and within-group sums of squares
//! 2. Shuffle the group labels `n_permutations` times
//! 3. Recompute the pseudo-F for every permutation
//! 4. P-value = (1 + #{F_perm >= F}) / (n_permutations + 1)
//!
//! Permutation `i` draws from its own generator seeded with `seed + i`, so the
//! result is the same whether permutations run in parallel or not.

use crate::distance::DistanceMatrix;
use crate::stats::summary::round_to;
use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for PERMANOVA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermanovaConfig {
    /// Number of label permutations.
    pub n_permutations: usize,
    /// Base seed for the permutation generators.
    pub seed: u64,
    /// Whether to run permutations on the rayon pool.
    pub parallel: bool,
}

impl Default for PermanovaConfig {
    fn default() -> Self {
        Self {
            n_permutations: 999,
            seed: 42,
            parallel: true,
        }
    }
}

/// PERMANOVA summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermanovaResult {
    /// Pseudo-F statistic.
    pub f_statistic: f64,
    /// Fraction of total sum of squares explained by grouping.
    pub r_squared: f64,
    pub p_value: f64,
    /// Permutations performed (0 when the test was not run).
    pub n_permutations: usize,
    pub n_groups: usize,
}

impl PermanovaResult {
    fn degenerate(n_groups: usize) -> Self {
        Self {
            f_statistic: 0.0,
            r_squared: 0.0,
            p_value: 1.0,
            n_permutations: 0,
            n_groups,
        }
    }
}

/// Run PERMANOVA for the grouping `classes` (one entry per matrix row).
///
/// Fewer than two groups, no within-group degrees of freedom or zero
/// within-group spread yield `F = 0, R² = 0, p = 1` without permuting.
pub fn permanova(
    distances: &DistanceMatrix,
    classes: &[i64],
    config: &PermanovaConfig,
) -> PermanovaResult {
    let n = distances.len().min(classes.len());
    let groups = encode_groups(&classes[..n]);
    let n_groups = groups.iter().copied().max().map_or(0, |g| g + 1);

    let values = distances.finite_values();
    let sq = values.map(|v| v * v);
    let df_between = n_groups as f64 - 1.0;
    let df_within = n as f64 - n_groups as f64;

    if n_groups < 2 || df_within <= 0.0 {
        log::debug!(
            "PERMANOVA skipped: {} samples in {} groups",
            n,
            n_groups
        );
        return PermanovaResult::degenerate(n_groups);
    }

    let ss_total = total_sum_of_squares(&sq, n);
    let ss_within = within_sum_of_squares(&sq, &groups, n_groups);
    if ss_within == 0.0 {
        return PermanovaResult::degenerate(n_groups);
    }

    let ss_between = ss_total - ss_within;
    let f_observed = (ss_between / df_between) / (ss_within / df_within);
    let r_squared = if ss_total > 0.0 {
        ss_between / ss_total
    } else {
        0.0
    };

    let permuted_f = |idx: usize| -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(idx as u64));
        let mut shuffled = groups.clone();
        shuffled.shuffle(&mut rng);
        let ss_w = within_sum_of_squares(&sq, &shuffled, n_groups);
        if ss_w == 0.0 {
            return f64::INFINITY;
        }
        ((ss_total - ss_w) / df_between) / (ss_w / df_within)
    };

    let n_extreme = if config.parallel {
        (0..config.n_permutations)
            .into_par_iter()
            .filter(|&i| permuted_f(i) >= f_observed)
            .count()
    } else {
        (0..config.n_permutations)
            .filter(|&i| permuted_f(i) >= f_observed)
            .count()
    };

    let p_value = (1 + n_extreme) as f64 / (config.n_permutations + 1) as f64;

    PermanovaResult {
        f_statistic: round_to(f_observed, 4),
        r_squared: round_to(r_squared, 4),
        p_value: round_to(p_value, 6),
        n_permutations: config.n_permutations,
        n_groups,
    }
}

/// Map class codes to dense group indices in ascending code order.
fn encode_groups(classes: &[i64]) -> Vec<usize> {
    let mut codes: BTreeMap<i64, usize> = BTreeMap::new();
    for &c in classes {
        codes.entry(c).or_insert(0);
    }
    for (idx, value) in codes.values_mut().enumerate() {
        *value = idx;
    }
    classes.iter().map(|c| codes[c]).collect()
}

fn total_sum_of_squares(sq: &DMatrix<f64>, n: usize) -> f64 {
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            total += sq[(i, j)];
        }
    }
    total / n as f64
}

/// Σ_g Σ_{i<j∈g} d² / n_g; singleton groups contribute nothing.
fn within_sum_of_squares(sq: &DMatrix<f64>, groups: &[usize], n_groups: usize) -> f64 {
    let mut sums = vec![0.0; n_groups];
    let mut sizes = vec![0usize; n_groups];
    let n = groups.len();
    for i in 0..n {
        sizes[groups[i]] += 1;
        for j in (i + 1)..n {
            if groups[i] == groups[j] {
                sums[groups[i]] += sq[(i, j)];
            }
        }
    }
    sums.iter()
        .zip(&sizes)
        .filter(|&(_, &size)| size >= 2)
        .map(|(s, &size)| s / size as f64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AbundanceMatrix;
    use crate::distance::distance_matrix;
    use rand::Rng;

    fn create_separated() -> (DistanceMatrix, Vec<i64>) {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let shift = if i < 10 { 0.0 } else { 10.0 };
                vec![shift + (i % 5) as f64 * 0.1, shift + (i % 3) as f64 * 0.1]
            })
            .collect();
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            (0..20).map(|i| format!("S{}", i)).collect(),
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let classes = (0..20).map(|i| (i >= 10) as i64).collect();
        (distance_matrix(&matrix, "euclidean"), classes)
    }

    #[test]
    fn test_separated_groups_significant() {
        let (d, classes) = create_separated();
        let result = permanova(&d, &classes, &PermanovaConfig::default());
        assert!(result.p_value < 0.05);
        assert!(result.r_squared > 0.9);
        assert_eq!(result.n_permutations, 999);
        assert_eq!(result.n_groups, 2);
    }

    #[test]
    fn test_interleaved_labels_not_significant() {
        let (d, _) = create_separated();
        // each label has five samples from each cluster
        let classes: Vec<i64> = (0..20).map(|i| (i % 2) as i64).collect();
        let result = permanova(&d, &classes, &PermanovaConfig::default());
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn test_shuffled_labels_rarely_significant() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let trials: u64 = 100;
        let mut significant = 0;
        for trial in 0..trials {
            let rows: Vec<Vec<f64>> = (0..30)
                .map(|_| (0..5).map(|_| rng.gen_range(0.0..10.0)).collect())
                .collect();
            let matrix = AbundanceMatrix::from_rows(
                &rows,
                (0..30).map(|i| format!("S{}", i)).collect(),
                (0..5).map(|f| format!("f{}", f)).collect(),
            )
            .unwrap();
            let mut classes: Vec<i64> = (0..30).map(|i| (i % 2) as i64).collect();
            classes.shuffle(&mut rng);

            let config = PermanovaConfig {
                n_permutations: 199,
                seed: trial,
                parallel: false,
            };
            let d = distance_matrix(&matrix, "braycurtis");
            if permanova(&d, &classes, &config).p_value <= 0.05 {
                significant += 1;
            }
        }
        assert!(
            significant <= 12,
            "{} of {} shuffled labelings significant",
            significant,
            trials
        );
    }

    #[test]
    fn test_p_value_keeps_six_places() {
        // 30 samples in two far-apart clusters; no relabeling reaches the observed F
        let rows: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let shift = if i < 15 { 0.0 } else { 50.0 };
                vec![shift + (i % 4) as f64 * 0.1, shift + (i % 7) as f64 * 0.1]
            })
            .collect();
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            (0..30).map(|i| format!("S{}", i)).collect(),
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let classes: Vec<i64> = (0..30).map(|i| (i >= 15) as i64).collect();
        let config = PermanovaConfig {
            n_permutations: 2999,
            ..Default::default()
        };
        let result = permanova(&distance_matrix(&matrix, "euclidean"), &classes, &config);
        assert_eq!(result.p_value, 0.000333);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (d, classes) = create_separated();
        let config = PermanovaConfig {
            n_permutations: 99,
            ..Default::default()
        };
        let parallel = permanova(&d, &classes, &config);
        let sequential = permanova(
            &d,
            &classes,
            &PermanovaConfig {
                parallel: false,
                ..config
            },
        );
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_single_group_short_circuits() {
        let (d, _) = create_separated();
        let result = permanova(&d, &vec![1; 20], &PermanovaConfig::default());
        assert_eq!(result.f_statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.n_permutations, 0);
    }

    #[test]
    fn test_zero_within_spread_short_circuits() {
        let rows = vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0]];
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            (0..4).map(|i| format!("S{}", i)).collect(),
            vec!["a".into()],
        )
        .unwrap();
        let d = distance_matrix(&matrix, "euclidean");
        let result = permanova(&d, &[0, 0, 1, 1], &PermanovaConfig::default());
        assert_eq!(result.r_squared, 0.0);
        assert_eq!(result.p_value, 1.0);
    }
}
