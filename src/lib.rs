//! Omics Data Exploration Library
//!
//! This library computes the exploration payloads behind an interactive
//! omics dashboard: per-feature statistics, display summaries, sample
//! ordination, co-abundance networks and the stability of feature selection
//! across a population of candidate models.
//!
//! # Overview
//!
//! - **data**: Abundance matrices, class labels, model populations
//! - **stats**: Descriptive statistics, histograms, boxplots, barcode heatmaps
//! - **distance**: Sample distance metrics and Spearman correlation
//! - **ordination**: PCoA, confidence ellipses, PERMANOVA
//! - **network**: Co-abundance graphs, Leiden communities, taxonomy colors
//! - **stability**: Kuncheva/Tanimoto/CW indices, model clustering
//! - **cache**: Time-bounded result cache
//! - **service**: The cached [`service::Explorer`] entry point
//!
//! # Example
//!
//! ```no_run
//! use omics_explore::prelude::*;
//!
//! let dataset = Dataset::load("X.tsv", "y.tsv", &LoadOptions::default()).unwrap();
//! let explorer = Explorer::new(ExploreConfig::default());
//!
//! let stats = explorer.feature_statistics(&dataset, &StatsParams::default());
//! let ordination = explorer
//!     .ordination(&dataset, &OrdinationParams::default())
//!     .unwrap();
//! println!(
//!     "{} features, PERMANOVA p = {}",
//!     stats.n_features, ordination.permanova.p_value
//! );
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod distance;
pub mod error;
pub mod network;
pub mod ordination;
pub mod service;
pub mod stability;
pub mod stats;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::cache::{CacheSettings, CacheStats, Clock, FakeClock, ResultCache, SystemClock};
    pub use crate::config::{CacheConfig, ExploreConfig};
    pub use crate::data::{
        align, load, AbundanceMatrix, CandidateModel, ClassLabels, LoadOptions, ModelFeature,
        ModelMetrics, ModelPopulation,
    };
    pub use crate::distance::{
        correlation_matrix, distance_matrix, CorrelationMatrix, DistanceMatrix, DistanceMetric,
    };
    pub use crate::error::{ExploreError, Result};
    pub use crate::network::{
        compute_coabundance_network, CoabundanceGraph, CoabundanceParams, TableTaxonomySource,
        Taxonomy, TaxonomyAnnotator, TaxonomyConfig, TaxonomySource,
    };
    pub use crate::ordination::{
        ordinate, pcoa, permanova, OrdinationParams, OrdinationResult, PermanovaConfig,
        PermanovaResult,
    };
    pub use crate::service::{Dataset, Explorer};
    pub use crate::stability::{compute_stability_analysis, StabilityParams, StabilityReport};
    pub use crate::stats::{
        barcode_matrix, boxplot_summary, feature_statistics, BarcodeMatrix, BarcodeOptions,
        BoxplotOptions, FeatureBoxplot, FeatureStatistics, StatsParams,
    };
}
