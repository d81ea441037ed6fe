//! Co-abundance networks: correlation graphs, communities, centrality and
//! taxonomic annotation.

mod builder;
mod centrality;
mod communities;
mod graph;
pub mod taxonomy;

pub use builder::{
    compute_coabundance_network, fbm_annotation, CoabundanceGraph, CoabundanceParams,
    FbmAnnotation, NetworkEdge, NetworkModule, NetworkNode, NetworkStats, FBM_SIGN_DOMINANCE,
};
pub use centrality::{betweenness_centrality, degree_centrality};
pub use communities::{leiden_communities, modularity};
pub use graph::{feature_graph, FeatureGraph};
pub use taxonomy::{
    build_color_legend, ColorLegend, LegendEntry, TableTaxonomySource, Taxonomy,
    TaxonomyAnnotator, TaxonomyConfig, TaxonomySource,
};
