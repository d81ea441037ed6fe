//! Stability of feature selection across a population of candidate models.

mod clustering;
mod indices;
mod report;

pub use clustering::{average_linkage, flat_clusters, Merge};
pub use indices::{
    kuncheva, mean_pairwise, relative_weighted_consistency, tanimoto, weighted_consistency,
};
pub use report::{
    compute_stability_analysis, dendrogram, feature_sparsity_heatmap, model_distance_matrix,
    stability_by_k, Dendrogram, KStability, ModelDistances, SparsityHeatmap, StabilityParams,
    StabilityReport, DEFAULT_CUT_DISTANCE,
};
