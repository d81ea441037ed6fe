//! Average-linkage agglomerative clustering.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// One agglomeration step.
///
/// Leaves are numbered `0..n`; the cluster created by merge `i` is `n + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    /// Leaves under the new cluster.
    pub size: usize,
}

/// Average (UPGMA) linkage over a square distance matrix.
///
/// At each step the closest pair of active clusters merges; ties go to the
/// pair with the smallest slot indices. Cached per-row minima keep the usual
/// cost near O(n²).
pub fn average_linkage(distances: &DMatrix<f64>) -> Vec<Merge> {
    let n = distances.nrows();
    if n < 2 {
        return Vec::new();
    }

    let mut d: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let v = distances[(i, j)];
                    if v.is_finite() {
                        v
                    } else {
                        f64::INFINITY
                    }
                })
                .collect()
        })
        .collect();
    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    let mut cluster_id: Vec<usize> = (0..n).collect();
    let mut best: Vec<Option<(f64, usize)>> = (0..n).map(|i| row_minimum(&d, &active, i)).collect();
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..(n - 1) {
        // global minimum over cached rows, smallest row on ties
        let mut pick: Option<(f64, usize, usize)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            if let Some((dist, j)) = best[i] {
                if pick.map_or(true, |(pd, _, _)| dist < pd) {
                    pick = Some((dist, i, j));
                }
            }
        }
        let Some((dist, i, j)) = pick else {
            break;
        };

        merges.push(Merge {
            left: cluster_id[i].min(cluster_id[j]),
            right: cluster_id[i].max(cluster_id[j]),
            distance: dist,
            size: size[i] + size[j],
        });

        // Lance-Williams update for average linkage, merged cluster keeps slot i
        let (ni, nj) = (size[i] as f64, size[j] as f64);
        for k in 0..n {
            if active[k] && k != i && k != j {
                let v = (ni * d[i][k] + nj * d[j][k]) / (ni + nj);
                d[i][k] = v;
                d[k][i] = v;
            }
        }
        active[j] = false;
        size[i] += size[j];
        cluster_id[i] = n + step;

        for k in 0..n {
            if !active[k] {
                continue;
            }
            let stale = match best[k] {
                Some((_, target)) => target == i || target == j,
                None => false,
            };
            if k == i || stale {
                best[k] = row_minimum(&d, &active, k);
            } else if k < i {
                if let Some((bd, bj)) = best[k] {
                    let v = d[k][i];
                    if v < bd || (v == bd && i < bj) {
                        best[k] = Some((v, i));
                    }
                }
            }
        }
    }

    merges
}

/// Closest active partner with a larger slot index.
fn row_minimum(d: &[Vec<f64>], active: &[bool], i: usize) -> Option<(f64, usize)> {
    let mut found: Option<(f64, usize)> = None;
    for (j, &v) in d[i].iter().enumerate().skip(i + 1) {
        if active[j] && found.map_or(true, |(bd, _)| v < bd) {
            found = Some((v, j));
        }
    }
    found
}

/// Flat clusters from merges at or below `cut`, labeled from 1 in order of
/// the first leaf of each cluster.
pub fn flat_clusters(n: usize, merges: &[Merge], cut: f64) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n + merges.len()).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cur = x;
        while parent[cur] != root {
            let next = parent[cur];
            parent[cur] = root;
            cur = next;
        }
        root
    }

    for (step, merge) in merges.iter().enumerate() {
        if merge.distance <= cut {
            let node = n + step;
            let a = find(&mut parent, merge.left);
            let b = find(&mut parent, merge.right);
            parent[a] = node;
            parent[b] = node;
        }
    }

    let mut labels = vec![0usize; n];
    let mut label_of_root: Vec<Option<usize>> = vec![None; n + merges.len()];
    let mut next = 1;
    for (leaf, label) in labels.iter_mut().enumerate() {
        let root = find(&mut parent, leaf);
        *label = *label_of_root[root].get_or_insert_with(|| {
            let l = next;
            next += 1;
            l
        });
    }
    labels
}
