//! Node centrality measures.

use super::graph::{degree, FeatureGraph};
use petgraph::graph::NodeIndex;
use std::collections::VecDeque;

/// Degree centrality: deg / (n - 1); zero below two nodes.
pub fn degree_centrality(graph: &FeatureGraph) -> Vec<f64> {
    let n = graph.node_count();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| degree(graph, i) as f64 / (n - 1) as f64)
        .collect()
}

/// Normalized shortest-path betweenness centrality (unweighted, Brandes).
///
/// Each unordered pair is counted once and the sum is scaled by
/// 2 / ((n - 1)(n - 2)).
pub fn betweenness_centrality(graph: &FeatureGraph) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0; n];
    if n < 3 {
        return centrality;
    }

    let mut stack = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];
    let mut queue = VecDeque::with_capacity(n);

    for source in 0..n {
        stack.clear();
        for p in predecessors.iter_mut() {
            p.clear();
        }
        sigma.iter_mut().for_each(|s| *s = 0.0);
        distance.iter_mut().for_each(|d| *d = -1);
        delta.iter_mut().for_each(|d| *d = 0.0);

        sigma[source] = 1.0;
        distance[source] = 0;
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for w in graph.neighbors(NodeIndex::new(v)).map(|w| w.index()) {
                if distance[w] < 0 {
                    distance[w] = distance[v] + 1;
                    queue.push_back(w);
                }
                if distance[w] == distance[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                centrality[w] += delta[w];
            }
        }
    }

    // every pair was visited from both endpoints
    let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    centrality.iter_mut().for_each(|c| *c *= scale);
    centrality
}
