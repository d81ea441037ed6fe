//! Co-abundance network construction.
//!
//! # Pipeline
//!
//! 1. Keep features present in at least `min_prevalence` percent of samples
//! 2. Intersect with the optional whitelist
//! 3. Optionally restrict samples to one class
//! 4. Spearman correlation between the surviving features
//! 5. Edges for |ρ| >= threshold (and p <= `max_p_value` when set)
//! 6. Leiden modularity communities on |ρ| weights, degree and betweenness
//!    centrality
//! 7. Taxonomy and model-population annotation of the nodes

use super::centrality::{betweenness_centrality, degree_centrality};
use super::communities::{leiden_communities, modularity};
use super::graph::{degree, density, feature_graph};
use super::taxonomy::{build_color_legend, ColorLegend, Taxonomy, TaxonomyAnnotator};
use crate::data::{AbundanceMatrix, ClassLabels, ModelPopulation};
use crate::distance::correlation_matrix;
use crate::error::Result;
use crate::stats::summary::{mean, prevalence, round_to};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Share of containing models that must agree on a sign for it to dominate.
pub const FBM_SIGN_DOMINANCE: f64 = 0.5;

/// Parameters of a co-abundance network request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoabundanceParams {
    /// Minimum prevalence in percent.
    pub min_prevalence: f64,
    /// Minimum |ρ| for an edge.
    pub correlation_threshold: f64,
    /// Maximum p-value for an edge, when set.
    pub max_p_value: Option<f64>,
    pub feature_whitelist: Option<Vec<String>>,
    /// Correlate only samples of this class.
    pub class_filter: Option<i64>,
    pub resolution: f64,
    pub seed: u64,
    /// See [`FBM_SIGN_DOMINANCE`].
    pub fbm_sign_dominance: f64,
}

impl Default for CoabundanceParams {
    fn default() -> Self {
        Self {
            min_prevalence: 10.0,
            correlation_threshold: 0.5,
            max_p_value: None,
            feature_whitelist: None,
            class_filter: None,
            resolution: 1.0,
            seed: 42,
            fbm_sign_dominance: FBM_SIGN_DOMINANCE,
        }
    }
}

/// Model-population support of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbmAnnotation {
    /// Fraction of models selecting the feature.
    pub fraction: f64,
    /// +1 or -1 when one sign dominates, 0 otherwise.
    pub sign: i8,
    pub n_models: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: String,
    /// Class with the higher prevalence; `None` on ties or with one class.
    pub enrichment: Option<i64>,
    pub mean_abundance: f64,
    pub prevalence: f64,
    pub degree: usize,
    pub degree_centrality: f64,
    pub betweenness: f64,
    pub community: usize,
    pub taxonomy: Option<Taxonomy>,
    pub color: String,
    pub fbm: Option<FbmAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    pub correlation: f64,
    pub p_value: Option<f64>,
}

/// A detected community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkModule {
    pub id: usize,
    pub members: Vec<String>,
    /// Most frequent family (else phylum) among annotated members.
    pub dominant_taxon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Features left after prevalence and whitelist filtering.
    pub n_features_tested: usize,
    pub n_nodes: usize,
    pub n_edges: usize,
    pub positive_edges: usize,
    pub negative_edges: usize,
    pub density: f64,
    pub n_modules: usize,
    pub modularity: f64,
}

/// Complete network payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoabundanceGraph {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub modules: Vec<NetworkModule>,
    pub legend: ColorLegend,
    pub stats: NetworkStats,
}

impl CoabundanceGraph {
    fn empty(n_features_tested: usize) -> Self {
        Self {
            stats: NetworkStats {
                n_features_tested,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Build the co-abundance network of aligned data.
pub fn compute_coabundance_network(
    matrix: &AbundanceMatrix,
    labels: &ClassLabels,
    params: &CoabundanceParams,
    taxonomy: Option<&TaxonomyAnnotator>,
    population: Option<&ModelPopulation>,
) -> Result<CoabundanceGraph> {
    let features = filter_features(matrix, params);
    if features.len() < 2 {
        log::info!(
            "Co-abundance network skipped: {} features pass filtering",
            features.len()
        );
        return Ok(CoabundanceGraph::empty(features.len()));
    }

    let mut subset = matrix.subset_features(&features)?;
    if let Some(class) = params.class_filter {
        let rows: Vec<usize> = labels
            .classes()
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == class)
            .map(|(i, _)| i)
            .collect();
        if rows.len() < 3 {
            log::info!("Co-abundance network skipped: {} samples in class {}", rows.len(), class);
            return Ok(CoabundanceGraph::empty(features.len()));
        }
        subset = subset.subset_samples(&rows)?;
    }

    let corr = correlation_matrix(&subset);
    let p = corr.len();
    let mut raw_edges = Vec::new();
    for i in 0..p {
        for j in (i + 1)..p {
            let rho = corr.rho(i, j);
            if !rho.is_finite() || rho.abs() < params.correlation_threshold {
                continue;
            }
            let pv = corr.p_value(i, j);
            if let Some(max_p) = params.max_p_value {
                if !(pv <= max_p) {
                    continue;
                }
            }
            raw_edges.push((i, j, rho, pv));
        }
    }

    // nodes are exactly the endpoints of surviving edges
    let mut node_of: BTreeMap<usize, usize> = BTreeMap::new();
    for &(i, j, _, _) in &raw_edges {
        node_of.insert(i, 0);
        node_of.insert(j, 0);
    }
    if node_of.is_empty() {
        return Ok(CoabundanceGraph::empty(features.len()));
    }
    for (idx, v) in node_of.values_mut().enumerate() {
        *v = idx;
    }
    let node_columns: Vec<usize> = node_of.keys().copied().collect();

    let node_ids: Vec<String> = node_columns.iter().map(|&c| corr.ids[c].clone()).collect();
    let graph = feature_graph(
        node_ids.iter().cloned(),
        raw_edges
            .iter()
            .map(|&(i, j, rho, _)| (node_of[&i], node_of[&j], rho.abs())),
    );
    let communities = leiden_communities(&graph, params.resolution, params.seed);
    let centrality = degree_centrality(&graph);
    let betweenness = betweenness_centrality(&graph);

    let taxa: HashMap<String, Taxonomy> = taxonomy
        .map(|annotator| annotator.annotate(&node_ids))
        .unwrap_or_default();
    let legend = build_color_legend(node_ids.iter().filter_map(|id| taxa.get(id)));
    let fbm = population.map(|pop| fbm_annotation(pop, params.fbm_sign_dominance));

    let groups = labels.class_indices();
    let nodes: Vec<NetworkNode> = node_ids
        .iter()
        .enumerate()
        .map(|(n, id)| {
            let column = features[node_columns[n]];
            let values = matrix.feature_values(column);
            let taxonomy = taxa.get(id).cloned();
            NetworkNode {
                id: id.clone(),
                enrichment: prevalence_enrichment(&values, &groups),
                mean_abundance: round_to(mean(&values), 6),
                prevalence: round_to(prevalence(&values), 6),
                degree: degree(&graph, n),
                degree_centrality: round_to(centrality[n], 6),
                betweenness: round_to(betweenness[n], 6),
                community: communities[n],
                color: legend.color_for(taxonomy.as_ref()),
                taxonomy,
                fbm: fbm.as_ref().map(|support| {
                    support.get(id).cloned().unwrap_or(FbmAnnotation {
                        fraction: 0.0,
                        sign: 0,
                        n_models: 0,
                    })
                }),
            }
        })
        .collect();

    let edges: Vec<NetworkEdge> = raw_edges
        .iter()
        .map(|&(i, j, rho, pv)| NetworkEdge {
            source: corr.ids[i].clone(),
            target: corr.ids[j].clone(),
            correlation: round_to(rho, 4),
            p_value: pv.is_finite().then(|| round_to(pv, 6)),
        })
        .collect();

    let modules = build_modules(&nodes);
    let positive_edges = raw_edges.iter().filter(|e| e.2 > 0.0).count();
    let stats = NetworkStats {
        n_features_tested: features.len(),
        n_nodes: nodes.len(),
        n_edges: edges.len(),
        positive_edges,
        negative_edges: edges.len() - positive_edges,
        density: round_to(density(&graph), 6),
        n_modules: modules.len(),
        modularity: round_to(modularity(&graph, &communities, params.resolution), 4),
    };

    log::info!(
        "Co-abundance network: {} nodes, {} edges, {} modules",
        stats.n_nodes,
        stats.n_edges,
        stats.n_modules
    );

    Ok(CoabundanceGraph {
        nodes,
        edges,
        modules,
        legend,
        stats,
    })
}

/// Column indices passing the prevalence filter and the whitelist.
fn filter_features(matrix: &AbundanceMatrix, params: &CoabundanceParams) -> Vec<usize> {
    let whitelist: Option<HashSet<&str>> = params
        .feature_whitelist
        .as_ref()
        .filter(|w| !w.is_empty())
        .map(|w| w.iter().map(String::as_str).collect());

    matrix
        .prevalence()
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p * 100.0 >= params.min_prevalence)
        .filter(|&(j, _)| {
            whitelist
                .as_ref()
                .map_or(true, |w| w.contains(matrix.feature_ids()[j].as_str()))
        })
        .map(|(j, _)| j)
        .collect()
}

fn prevalence_enrichment(values: &[f64], groups: &BTreeMap<i64, Vec<usize>>) -> Option<i64> {
    if groups.len() < 2 {
        return None;
    }
    let mut best: Option<(i64, f64)> = None;
    let mut tied = false;
    for (&class, members) in groups {
        let class_values: Vec<f64> = members.iter().map(|&i| values[i]).collect();
        let p = prevalence(&class_values);
        match best {
            Some((_, bp)) if p == bp => tied = true,
            Some((_, bp)) if p < bp => {}
            _ => {
                best = Some((class, p));
                tied = false;
            }
        }
    }
    if tied {
        None
    } else {
        best.map(|(class, _)| class)
    }
}

/// Per-feature support across a model population.
pub fn fbm_annotation(population: &ModelPopulation, dominance: f64) -> HashMap<String, FbmAnnotation> {
    let models = population.resolved();
    let total = models.len();
    let mut signs: HashMap<String, (usize, usize)> = HashMap::new();
    for model in &models {
        for (name, &coef) in &model.features {
            let entry = signs.entry(name.clone()).or_insert((0, 0));
            if coef > 0 {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }

    signs
        .into_iter()
        .map(|(name, (pos, neg))| {
            let count = pos + neg;
            let sign = if pos as f64 / count as f64 > dominance {
                1
            } else if neg as f64 / count as f64 > dominance {
                -1
            } else {
                0
            };
            let fraction = if total == 0 { 0.0 } else { count as f64 / total as f64 };
            (
                name,
                FbmAnnotation {
                    fraction: round_to(fraction, 4),
                    sign,
                    n_models: count,
                },
            )
        })
        .collect()
}

fn build_modules(nodes: &[NetworkNode]) -> Vec<NetworkModule> {
    let mut members: BTreeMap<usize, Vec<&NetworkNode>> = BTreeMap::new();
    for node in nodes {
        members.entry(node.community).or_default().push(node);
    }
    members
        .into_iter()
        .map(|(id, group)| NetworkModule {
            id,
            dominant_taxon: dominant_taxon(&group),
            members: group.iter().map(|n| n.id.clone()).collect(),
        })
        .collect()
}

fn dominant_taxon(group: &[&NetworkNode]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in group {
        if let Some(t) = &node.taxonomy {
            if let Some(label) = t.family.as_deref().or(t.phylum.as_deref()) {
                *counts.entry(label).or_insert(0) += 1;
            }
        }
    }
    // BTreeMap order makes the alphabetically first label win ties
    counts
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (label, n)| match best {
            Some((_, bn)) if bn >= n => best,
            _ => Some((label, n)),
        })
        .map(|(label, _)| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CandidateModel, ModelFeature};
    use crate::network::taxonomy::{TableTaxonomySource, TaxonomyConfig, UNKNOWN_COLOR};
    use std::sync::Arc;

    /// Two correlated blocks of features plus a noise feature.
    fn create_test_data() -> (AbundanceMatrix, ClassLabels) {
        let n = 12;
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let x = i as f64 + 1.0;
                let y = ((i * 7) % n) as f64 + 1.0;
                vec![x, 2.0 * x + 1.0, x * x, y, y + 0.5, if i == 0 { 1.0 } else { 0.0 }]
            })
            .collect();
        let samples: Vec<String> = (0..n).map(|i| format!("S{}", i)).collect();
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            samples.clone(),
            ["a1", "a2", "a3", "b1", "b2", "rare"].iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        let labels = ClassLabels::new(samples, (0..n).map(|i| (i >= 6) as i64).collect()).unwrap();
        (matrix, labels)
    }

    #[test]
    fn test_blocks_become_modules() {
        let (matrix, labels) = create_test_data();
        let params = CoabundanceParams {
            correlation_threshold: 0.9,
            ..Default::default()
        };
        let graph = compute_coabundance_network(&matrix, &labels, &params, None, None).unwrap();
        // rare feature fails the prevalence filter
        assert_eq!(graph.stats.n_features_tested, 5);
        assert_eq!(graph.stats.n_nodes, 5);
        assert_eq!(graph.stats.n_edges, 4);
        assert_eq!(graph.stats.positive_edges, 4);
        assert_eq!(graph.modules.len(), 2);
        assert_eq!(graph.modules[0].members, vec!["a1", "a2", "a3"]);
        assert!(graph.nodes.iter().all(|n| n.degree >= 1));
        assert!(graph.nodes.iter().all(|n| n.fbm.is_none()));
        // a1 is present in every sample of both classes
        assert_eq!(graph.nodes[0].enrichment, None);
        assert_eq!(graph.nodes[0].color, UNKNOWN_COLOR);
    }

    #[test]
    fn test_too_few_features_is_empty() {
        let (matrix, labels) = create_test_data();
        let params = CoabundanceParams {
            feature_whitelist: Some(vec!["a1".into()]),
            ..Default::default()
        };
        let graph = compute_coabundance_network(&matrix, &labels, &params, None, None).unwrap();
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
        assert_eq!(graph.stats.n_edges, 0);
        assert_eq!(graph.stats.n_features_tested, 1);
    }

    #[test]
    fn test_annotations() {
        let (matrix, labels) = create_test_data();
        let mut entries = HashMap::new();
        entries.insert(
            "a1".to_string(),
            Taxonomy {
                phylum: Some("Firmicutes".into()),
                family: Some("Lachnospiraceae".into()),
                ..Default::default()
            },
        );
        let annotator = TaxonomyAnnotator::new(
            Arc::new(TableTaxonomySource::new(entries)),
            &TaxonomyConfig::default(),
        )
        .unwrap();

        let model = |coef: i64| CandidateModel {
            k: Some(1),
            features: vec![ModelFeature {
                index: None,
                name: Some("a1".into()),
                coefficient: coef,
            }],
            ..Default::default()
        };
        let population = ModelPopulation::new(Vec::new(), vec![model(1), model(1), model(-1), CandidateModel::default()]);

        let params = CoabundanceParams {
            correlation_threshold: 0.9,
            ..Default::default()
        };
        let graph =
            compute_coabundance_network(&matrix, &labels, &params, Some(&annotator), Some(&population))
                .unwrap();
        let a1 = graph.nodes.iter().find(|n| n.id == "a1").unwrap();
        assert_eq!(a1.fbm.as_ref().unwrap().fraction, 0.75);
        assert_eq!(a1.fbm.as_ref().unwrap().sign, 1);
        assert_eq!(graph.legend.entries.len(), 1);
        assert_eq!(a1.color, graph.legend.entries[0].color);
        assert_eq!(graph.modules[0].dominant_taxon.as_deref(), Some("Lachnospiraceae"));

        let b1 = graph.nodes.iter().find(|n| n.id == "b1").unwrap();
        assert_eq!(b1.fbm.as_ref().unwrap().fraction, 0.0);
        assert!(b1.taxonomy.is_none());
    }

    #[test]
    fn test_p_value_filter_drops_edges() {
        let (matrix, labels) = create_test_data();
        let params = CoabundanceParams {
            correlation_threshold: 0.0,
            max_p_value: Some(1e-6),
            ..Default::default()
        };
        let graph = compute_coabundance_network(&matrix, &labels, &params, None, None).unwrap();
        assert!(graph.edges.iter().all(|e| e.p_value.map_or(false, |p| p <= 1e-6)));
    }
}
