//! Feature-selection stability indices.
//!
//! All indices compare sets of selected features drawn from a universe of
//! `c` candidate features.

use std::collections::{BTreeMap, BTreeSet};

/// Kuncheva consistency index, corrected for chance overlap.
///
/// κ = (r - d²/c) / (d(1 - d/c)) with r = |A ∩ B| and d the mean set size.
/// Returns 0 when c = 0, d = 0 or d >= c.
pub fn kuncheva<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>, c: usize) -> f64 {
    let c = c as f64;
    let d = (a.len() + b.len()) as f64 / 2.0;
    if c == 0.0 || d == 0.0 || d >= c {
        return 0.0;
    }
    let r = a.intersection(b).count() as f64;
    (r - d * d / c) / (d * (1.0 - d / c))
}

/// Tanimoto (Jaccard) similarity |A ∩ B| / |A ∪ B|; 1 for two empty sets.
pub fn tanimoto<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Weighted consistency CW = Σ_f (N_f / N) (N_f - 1) / (K - 1).
///
/// N_f counts the sets containing f, N is the total number of selections and
/// K the number of sets. One set (or none) is perfectly consistent.
pub fn weighted_consistency<T: Ord>(sets: &[BTreeSet<T>]) -> f64 {
    let k = sets.len();
    if k <= 1 {
        return 1.0;
    }
    let mut occurrences: BTreeMap<&T, usize> = BTreeMap::new();
    for set in sets {
        for f in set {
            *occurrences.entry(f).or_insert(0) += 1;
        }
    }
    let n: usize = occurrences.values().sum();
    if n == 0 {
        return 0.0;
    }
    occurrences
        .values()
        .map(|&nf| (nf as f64 / n as f64) * (nf as f64 - 1.0) / (k as f64 - 1.0))
        .sum()
}

/// CW rescaled between its chance level (mean set size / c) and 1, clamped to [0, 1].
pub fn relative_weighted_consistency<T: Ord>(sets: &[BTreeSet<T>], c: usize) -> f64 {
    if c == 0 || sets.is_empty() {
        return 0.0;
    }
    let mean_size = sets.iter().map(BTreeSet::len).sum::<usize>() as f64 / sets.len() as f64;
    let min = mean_size / c as f64;
    let max = 1.0;
    if max - min <= 0.0 {
        return 0.0;
    }
    ((weighted_consistency(sets) - min) / (max - min)).clamp(0.0, 1.0)
}

/// Mean of `index` over all unordered pairs of `sets`; 1 for fewer than two sets.
pub fn mean_pairwise<T, F>(sets: &[BTreeSet<T>], index: F) -> f64
where
    T: Ord,
    F: Fn(&BTreeSet<T>, &BTreeSet<T>) -> f64,
{
    let n = sets.len();
    if n < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            total += index(&sets[i], &sets[j]);
        }
    }
    total / (n * (n - 1) / 2) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn set(items: &[&'static str]) -> BTreeSet<&'static str> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_identical_sets() {
        let a = set(&["a", "b", "c"]);
        assert_relative_eq!(kuncheva(&a, &a, 10), 1.0);
        assert_eq!(tanimoto(&a, &a), 1.0);
    }

    #[test]
    fn test_disjoint_sets() {
        let a = set(&["a", "b"]);
        let b = set(&["c", "d"]);
        assert_eq!(tanimoto(&a, &b), 0.0);
        // r = 0, d = 2, c = 10: (0 - 0.4) / (2 * 0.8)
        assert_relative_eq!(kuncheva(&a, &b, 10), -0.25);
        assert!(kuncheva(&a, &b, 10) <= 0.0);
    }

    #[test]
    fn test_kuncheva_degenerate() {
        let a = set(&["a", "b"]);
        assert_eq!(kuncheva(&a, &a, 0), 0.0);
        assert_eq!(kuncheva(&a, &a, 2), 0.0);
        let empty = set(&[]);
        assert_eq!(kuncheva(&empty, &empty, 5), 0.0);
        assert_eq!(tanimoto(&empty, &empty), 1.0);
    }

    #[test]
    fn test_kuncheva_unequal_sizes() {
        let a = set(&["a", "b"]);
        let b = set(&["a", "b", "c", "d"]);
        // d = 3, r = 2, c = 12: (2 - 0.75) / (3 * 0.75)
        assert_relative_eq!(kuncheva(&a, &b, 12), 1.25 / 2.25);
    }

    #[test]
    fn test_weighted_consistency() {
        let sets = vec![set(&["a", "b"]), set(&["a", "b"])];
        assert_relative_eq!(weighted_consistency(&sets), 1.0);
        let sets = vec![set(&["a"]), set(&["b"])];
        assert_eq!(weighted_consistency(&sets), 0.0);
        assert_eq!(weighted_consistency(&[set(&["a"])]), 1.0);
    }

    #[test]
    fn test_relative_weighted_consistency() {
        let identical = vec![set(&["a", "b"]), set(&["a", "b"]), set(&["a", "b"])];
        assert_relative_eq!(relative_weighted_consistency(&identical, 10), 1.0);
        let disjoint = vec![set(&["a"]), set(&["b"]), set(&["c"])];
        assert_eq!(relative_weighted_consistency(&disjoint, 10), 0.0);
        assert_eq!(relative_weighted_consistency(&identical, 0), 0.0);
        let empty: Vec<BTreeSet<&str>> = Vec::new();
        assert_eq!(relative_weighted_consistency(&empty, 10), 0.0);
    }

    #[test]
    fn test_mean_pairwise() {
        let sets = vec![set(&["a"]), set(&["a"]), set(&["b"])];
        assert_relative_eq!(mean_pairwise(&sets, tanimoto), 1.0 / 3.0);
        assert_eq!(mean_pairwise(&sets[..1], tanimoto), 1.0);
    }
}
