//! Undirected co-abundance graph on `petgraph`.
//!
//! Node weights are feature ids and edge weights are |ρ|. Node indices follow
//! insertion order, so position `i` in the id list is `NodeIndex::new(i)`.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

/// Feature graph with |ρ| edge weights.
pub type FeatureGraph = UnGraph<String, f64>;

/// Build a graph over `ids` from `(a, b, weight)` position triples.
///
/// Self-loops and out-of-range endpoints are skipped.
pub fn feature_graph(
    ids: impl IntoIterator<Item = String>,
    edges: impl IntoIterator<Item = (usize, usize, f64)>,
) -> FeatureGraph {
    let mut graph = FeatureGraph::default();
    let nodes: Vec<NodeIndex> = ids.into_iter().map(|id| graph.add_node(id)).collect();
    for (a, b, weight) in edges {
        if a == b || a >= nodes.len() || b >= nodes.len() {
            continue;
        }
        graph.add_edge(nodes[a], nodes[b], weight);
    }
    graph
}

/// Number of incident edges.
pub fn degree(graph: &FeatureGraph, node: usize) -> usize {
    graph.edges(NodeIndex::new(node)).count()
}

/// Sum of incident edge weights.
pub fn strength(graph: &FeatureGraph, node: usize) -> f64 {
    graph.edges(NodeIndex::new(node)).map(|e| *e.weight()).sum()
}

pub fn total_weight(graph: &FeatureGraph) -> f64 {
    graph.edge_references().map(|e| *e.weight()).sum()
}

/// Edge density 2E / (n(n - 1)); zero below two nodes.
pub fn density(graph: &FeatureGraph) -> f64 {
    let n = graph.node_count();
    if n < 2 {
        return 0.0;
    }
    2.0 * graph.edge_count() as f64 / (n * (n - 1)) as f64
}
