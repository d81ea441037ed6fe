//! Fixed-bin-count histograms.

use serde::{Deserialize, Serialize};

/// Histogram payload: `edges.len() == counts.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Total number of binned values.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Bin values into `bin_count` equal-width bins.
///
/// Bins are half-open except the last, which includes its right edge.
/// Values outside `range` and non-finite values are ignored. Without a range
/// the data extent is used, widened by 0.5 on both sides when degenerate;
/// an empty input defaults to [0, 1].
pub fn histogram(values: &[f64], bin_count: usize, range: Option<(f64, f64)>) -> Histogram {
    let bin_count = bin_count.max(1);
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();

    let (mut lo, mut hi) = match range {
        Some(r) => r,
        None if finite.is_empty() => (0.0, 1.0),
        None => (
            finite.iter().copied().fold(f64::INFINITY, f64::min),
            finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ),
    };
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bin_count as f64;
    let edges: Vec<f64> = (0..=bin_count).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0usize; bin_count];
    for v in finite {
        if v < lo || v > hi {
            continue;
        }
        let bin = if v == hi {
            bin_count - 1
        } else {
            (((v - lo) / width) as usize).min(bin_count - 1)
        };
        counts[bin] += 1;
    }

    Histogram { edges, counts }
}

/// Histogram of prevalence values given as fractions, binned in percent over [0, 100].
pub fn prevalence_histogram(prevalence: &[f64], bin_count: usize) -> Histogram {
    let percent: Vec<f64> = prevalence.iter().map(|p| p * 100.0).collect();
    histogram(&percent, bin_count, Some((0.0, 100.0)))
}
