//! Stability report over a population of candidate models.

use super::clustering::{average_linkage, flat_clusters, Merge};
use super::indices::{kuncheva, mean_pairwise, relative_weighted_consistency, tanimoto};
use crate::data::{ModelPopulation, ResolvedModel};
use crate::stats::summary::round_to;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tanimoto distance at which the model dendrogram is cut.
pub const DEFAULT_CUT_DISTANCE: f64 = 0.7;

const INDEX_PLACES: i32 = 4;

/// Parameters of the stability analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityParams {
    pub cut_distance: f64,
    /// Features kept in the sparsity heatmap.
    pub heatmap_top_features: usize,
    /// Models kept in the distance matrix payload.
    pub max_distance_models: usize,
}

impl Default for StabilityParams {
    fn default() -> Self {
        Self {
            cut_distance: DEFAULT_CUT_DISTANCE,
            heatmap_top_features: 50,
            max_distance_models: 200,
        }
    }
}

/// Aggregate stability of the models sharing one sparsity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KStability {
    pub k: usize,
    pub n_models: usize,
    pub kuncheva: f64,
    pub tanimoto: f64,
    pub cw_rel: f64,
    pub mean_auc: f64,
    pub mean_accuracy: f64,
}

/// Linkage structure and flat clusters over all models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dendrogram {
    pub merges: Vec<Merge>,
    /// Cluster label (from 1) per model.
    pub clusters: Vec<usize>,
    pub n_clusters: usize,
    pub cut_distance: f64,
}

/// Feature × k prevalence matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparsityHeatmap {
    pub features: Vec<String>,
    pub k_values: Vec<usize>,
    /// `values[f][k]`: fraction of models at `k_values[k]` selecting `features[f]`.
    pub values: Vec<Vec<f64>>,
    /// Total number of models selecting each feature.
    pub occurrences: Vec<usize>,
}

/// Pairwise Tanimoto distances over the leading models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDistances {
    pub model_indices: Vec<usize>,
    pub values: Vec<Vec<f64>>,
    pub truncated: bool,
    pub total_models: usize,
}

/// Complete stability payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub n_models: usize,
    pub universe_size: usize,
    pub by_k: Vec<KStability>,
    pub dendrogram: Dendrogram,
    pub heatmap: SparsityHeatmap,
    pub distances: ModelDistances,
}

fn feature_sets(models: &[ResolvedModel]) -> Vec<BTreeSet<&str>> {
    models.iter().map(ResolvedModel::feature_set).collect()
}

/// Per-sparsity-level indices; levels without models are absent.
pub fn stability_by_k(models: &[ResolvedModel], universe_size: usize) -> Vec<KStability> {
    let mut groups: BTreeMap<usize, Vec<&ResolvedModel>> = BTreeMap::new();
    for model in models {
        groups.entry(model.k).or_default().push(model);
    }

    groups
        .into_iter()
        .map(|(k, group)| {
            let sets: Vec<BTreeSet<&str>> = group.iter().map(|m| m.feature_set()).collect();
            let n = group.len() as f64;
            let (kappa, tani, cw) = if group.len() < 2 {
                (1.0, 1.0, 1.0)
            } else {
                (
                    mean_pairwise(&sets, |a, b| kuncheva(a, b, universe_size)),
                    mean_pairwise(&sets, tanimoto),
                    relative_weighted_consistency(&sets, universe_size),
                )
            };
            KStability {
                k,
                n_models: group.len(),
                kuncheva: round_to(kappa, INDEX_PLACES),
                tanimoto: round_to(tani, INDEX_PLACES),
                cw_rel: round_to(cw, INDEX_PLACES),
                mean_auc: round_to(group.iter().map(|m| m.metrics.auc).sum::<f64>() / n, INDEX_PLACES),
                mean_accuracy: round_to(
                    group.iter().map(|m| m.metrics.accuracy).sum::<f64>() / n,
                    INDEX_PLACES,
                ),
            }
        })
        .collect()
}

/// Tanimoto distance (1 - similarity) between every pair of sets.
fn tanimoto_distances(sets: &[BTreeSet<&str>]) -> DMatrix<f64> {
    let n = sets.len();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| if i == j { 0.0 } else { 1.0 - tanimoto(&sets[i], &sets[j]) })
                .collect()
        })
        .collect();
    DMatrix::from_fn(n, n, |i, j| rows[i][j])
}

/// Average-linkage dendrogram over all models, cut at `cut_distance`.
pub fn dendrogram(models: &[ResolvedModel], cut_distance: f64) -> Dendrogram {
    let n = models.len();
    if n < 2 {
        return Dendrogram {
            merges: Vec::new(),
            clusters: vec![1; n],
            n_clusters: n,
            cut_distance,
        };
    }

    let distances = tanimoto_distances(&feature_sets(models));
    let mut merges = average_linkage(&distances);
    let clusters = flat_clusters(n, &merges, cut_distance);
    for m in merges.iter_mut() {
        m.distance = round_to(m.distance, INDEX_PLACES);
    }
    let n_clusters = clusters.iter().copied().max().unwrap_or(0);

    Dendrogram {
        merges,
        clusters,
        n_clusters,
        cut_distance,
    }
}

/// Heatmap of the `top_n` most selected features across sparsity levels.
pub fn feature_sparsity_heatmap(models: &[ResolvedModel], top_n: usize) -> SparsityHeatmap {
    let mut per_k: BTreeMap<usize, usize> = BTreeMap::new();
    let mut counts: BTreeMap<&str, BTreeMap<usize, usize>> = BTreeMap::new();
    for model in models {
        *per_k.entry(model.k).or_insert(0) += 1;
        for name in model.features.keys() {
            *counts
                .entry(name.as_str())
                .or_default()
                .entry(model.k)
                .or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts
        .iter()
        .map(|(&name, by_k)| (name, by_k.values().sum()))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.truncate(top_n);

    let k_values: Vec<usize> = per_k.keys().copied().collect();
    let values = ranked
        .iter()
        .map(|(name, _)| {
            k_values
                .iter()
                .map(|k| {
                    let hits = counts[name].get(k).copied().unwrap_or(0);
                    round_to(hits as f64 / per_k[k] as f64, INDEX_PLACES)
                })
                .collect()
        })
        .collect();

    SparsityHeatmap {
        features: ranked.iter().map(|(name, _)| name.to_string()).collect(),
        k_values,
        values,
        occurrences: ranked.iter().map(|&(_, c)| c).collect(),
    }
}

/// Pairwise Tanimoto distances over at most the first `max_models` models.
pub fn model_distance_matrix(models: &[ResolvedModel], max_models: usize) -> ModelDistances {
    let kept = models.len().min(max_models);
    let distances = tanimoto_distances(&feature_sets(&models[..kept]));
    ModelDistances {
        model_indices: (0..kept).collect(),
        values: (0..kept)
            .map(|i| {
                (0..kept)
                    .map(|j| round_to(distances[(i, j)], INDEX_PLACES))
                    .collect()
            })
            .collect(),
        truncated: kept < models.len(),
        total_models: models.len(),
    }
}

/// Full stability analysis; an empty population yields an empty report.
pub fn compute_stability_analysis(
    population: &ModelPopulation,
    params: &StabilityParams,
) -> StabilityReport {
    if population.is_empty() {
        log::info!("Stability analysis skipped: empty model population");
        return StabilityReport {
            dendrogram: Dendrogram {
                cut_distance: params.cut_distance,
                ..Default::default()
            },
            ..Default::default()
        };
    }

    let models = population.resolved();
    let universe_size = population.universe_size();
    let report = StabilityReport {
        n_models: models.len(),
        universe_size,
        by_k: stability_by_k(&models, universe_size),
        dendrogram: dendrogram(&models, params.cut_distance),
        heatmap: feature_sparsity_heatmap(&models, params.heatmap_top_features),
        distances: model_distance_matrix(&models, params.max_distance_models),
    };
    log::info!(
        "Stability analysis of {} models: {} sparsity levels, {} clusters",
        report.n_models,
        report.by_k.len(),
        report.dendrogram.n_clusters
    );
    report
}
