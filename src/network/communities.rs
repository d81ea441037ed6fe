//! Modularity communities via the Leiden algorithm.
//!
//! Node weights are weighted degrees, so the constant Potts model solved by
//! `leiden` at resolution γ / 2m is modularity at resolution γ. Leiden refines
//! the Louvain local-moving phase and never returns disconnected communities.
//!
//! Community labels are renumbered by size (largest first), ties broken by
//! the smallest member index, so the output is stable for a fixed seed.

use super::graph::{strength, total_weight, FeatureGraph};
use leiden::clustering::SimpleClustering;
use leiden::leiden::Leiden;
use leiden::network::Graph as LeidenGraph;
use leiden::{Clustering, Network};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Randomness of the Leiden refinement step.
const RANDOMNESS: f64 = 0.01;
const MAX_ITERATIONS: usize = 10;

/// Community label per node; isolated nodes form singleton communities.
pub fn leiden_communities(graph: &FeatureGraph, resolution: f64, seed: u64) -> Vec<usize> {
    let n = graph.node_count();
    let total = total_weight(graph);
    if n == 0 {
        return Vec::new();
    }
    if total <= 0.0 {
        return (0..n).collect();
    }

    let mut leiden_graph = LeidenGraph::with_capacity(n, graph.edge_count());
    for node in 0..n {
        leiden_graph.add_node(strength(graph, node) as f32);
    }
    for edge in graph.edge_references() {
        leiden_graph.add_edge(
            (edge.source().index() as u32).into(),
            (edge.target().index() as u32).into(),
            *edge.weight() as f32,
        );
    }
    let network = Network::new_from_graph(leiden_graph);

    let mut leiden = Leiden::new(resolution / (2.0 * total), RANDOMNESS, Some(seed as usize));
    let mut clustering = SimpleClustering::init_different_clusters(n);
    for iteration in 0..MAX_ITERATIONS {
        if !leiden.iterate(&network, &mut clustering) {
            log::trace!("Leiden converged after {} iterations", iteration + 1);
            break;
        }
    }

    let labels: Vec<usize> = (0..n).map(|i| clustering.get(i)).collect();
    relabel_by_size(&labels)
}

/// Renumber labels densely in order of first appearance.
fn compact(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut map: HashMap<usize, usize> = HashMap::new();
    let out = labels
        .iter()
        .map(|&l| {
            let next = map.len();
            *map.entry(l).or_insert(next)
        })
        .collect();
    (out, map.len())
}

fn relabel_by_size(labels: &[usize]) -> Vec<usize> {
    let (dense, k) = compact(labels);
    let mut sizes = vec![0usize; k];
    for &c in &dense {
        sizes[c] += 1;
    }
    let mut ranked: Vec<usize> = (0..k).collect();
    ranked.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));
    let mut new_label = vec![0usize; k];
    for (rank, &c) in ranked.iter().enumerate() {
        new_label[c] = rank;
    }
    dense.iter().map(|&c| new_label[c]).collect()
}

/// Weighted modularity Q of a partition at the given resolution.
pub fn modularity(graph: &FeatureGraph, communities: &[usize], resolution: f64) -> f64 {
    let m = total_weight(graph);
    if m <= 0.0 || communities.len() != graph.node_count() {
        return 0.0;
    }
    let k = communities.iter().copied().max().map_or(0, |c| c + 1);
    let mut internal = vec![0.0; k];
    let mut totals = vec![0.0; k];
    for edge in graph.edge_references() {
        let (a, b) = (edge.source().index(), edge.target().index());
        if communities[a] == communities[b] {
            internal[communities[a]] += *edge.weight();
        }
    }
    for (node, &c) in communities.iter().enumerate() {
        totals[c] += strength(graph, node);
    }
    internal
        .iter()
        .zip(&totals)
        .map(|(l, t)| l / m - resolution * (t / (2.0 * m)).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::graph::feature_graph;

    fn indexed(n: usize, edges: Vec<(usize, usize, f64)>) -> FeatureGraph {
        feature_graph((0..n).map(|i| format!("f{}", i)), edges)
    }

    fn create_two_cliques() -> FeatureGraph {
        let mut edges = Vec::new();
        for base in [0, 4] {
            for i in 0..4 {
                for j in (i + 1)..4 {
                    edges.push((base + i, base + j, 1.0));
                }
            }
        }
        edges.push((3, 4, 0.1));
        indexed(8, edges)
    }

    #[test]
    fn test_finds_two_cliques() {
        let g = create_two_cliques();
        let communities = leiden_communities(&g, 1.0, 42);
        assert!(communities[..4].iter().all(|&c| c == communities[0]));
        assert!(communities[4..].iter().all(|&c| c == communities[4]));
        assert_ne!(communities[0], communities[4]);
        assert!(modularity(&g, &communities, 1.0) > 0.4);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let g = create_two_cliques();
        assert_eq!(leiden_communities(&g, 1.0, 7), leiden_communities(&g, 1.0, 7));
    }

    #[test]
    fn test_labels_ordered_by_size() {
        let g = indexed(5, vec![(3, 4, 1.0), (0, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0)]);
        let communities = leiden_communities(&g, 1.0, 42);
        assert_eq!(communities, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_edgeless_graph() {
        let g = indexed(3, Vec::new());
        assert_eq!(leiden_communities(&g, 1.0, 42), vec![0, 1, 2]);
        assert_eq!(modularity(&g, &[0, 1, 2], 1.0), 0.0);
    }

    #[test]
    fn test_modularity_of_known_partition() {
        let g = create_two_cliques();
        let q = modularity(&g, &[0, 0, 0, 0, 1, 1, 1, 1], 1.0);
        // two cliques of weight 6 in m = 12.1, each with total degree 12.1
        let expected = 2.0 * (6.0 / 12.1 - 0.25);
        assert!((q - expected).abs() < 1e-12);
        assert_eq!(modularity(&g, &[0, 0], 1.0), 0.0);
    }

    #[test]
    fn test_relabel_by_size() {
        assert_eq!(relabel_by_size(&[7, 3, 3, 9, 3, 7]), vec![1, 0, 0, 2, 0, 1]);
    }
}
