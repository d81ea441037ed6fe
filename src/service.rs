//! Explorer service: the computations request handlers call, with caching.
//!
//! Feature statistics and co-abundance networks are cached per parameter
//! set; ordination, display payloads and stability reports are recomputed on
//! every call.

use crate::cache::{CacheStats, Clock, ResultCache, SystemClock};
use crate::config::ExploreConfig;
use crate::data::{AbundanceMatrix, ClassLabels, LoadOptions, ModelPopulation};
use crate::error::Result;
use crate::network::{
    compute_coabundance_network, CoabundanceGraph, CoabundanceParams, TaxonomyAnnotator,
    TaxonomySource,
};
use crate::ordination::{ordinate, OrdinationParams, OrdinationResult};
use crate::stability::{compute_stability_analysis, StabilityParams, StabilityReport};
use crate::stats::{
    barcode_matrix, boxplot_summary, feature_statistics, BarcodeMatrix, BarcodeOptions,
    BoxplotOptions, FeatureBoxplot, FeatureStatistics, StatsParams,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

/// An aligned matrix/label pair with a stable identity used in cache keys.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: String,
    pub matrix: AbundanceMatrix,
    pub labels: ClassLabels,
}

impl Dataset {
    pub fn new(id: impl Into<String>, matrix: AbundanceMatrix, labels: ClassLabels) -> Self {
        Self {
            id: id.into(),
            matrix,
            labels,
        }
    }

    /// Load and align from disk; the identity covers the paths and options.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        x_path: P,
        y_path: Q,
        options: &LoadOptions,
    ) -> Result<Self> {
        let (matrix, labels) = crate::data::load(x_path.as_ref(), y_path.as_ref(), options)?;
        let mut hasher = DefaultHasher::new();
        options.hash(&mut hasher);
        let id = format!(
            "{}|{}|{:016x}",
            x_path.as_ref().display(),
            y_path.as_ref().display(),
            hasher.finish()
        );
        Ok(Self::new(id, matrix, labels))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatsKey {
    dataset: String,
    alpha: u64,
    histogram_bins: usize,
}

impl StatsKey {
    fn new(dataset: &Dataset, params: &StatsParams) -> Self {
        Self {
            dataset: dataset.id.clone(),
            alpha: params.alpha.to_bits(),
            histogram_bins: params.histogram_bins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NetworkKey {
    dataset: String,
    min_prevalence: u64,
    correlation_threshold: u64,
    max_p_value: Option<u64>,
    feature_whitelist: Option<Vec<String>>,
    class_filter: Option<i64>,
    resolution: u64,
    seed: u64,
    fbm_sign_dominance: u64,
    population: Option<u64>,
}

impl NetworkKey {
    fn new(dataset: &Dataset, params: &CoabundanceParams, population: Option<&ModelPopulation>) -> Self {
        Self {
            dataset: dataset.id.clone(),
            min_prevalence: params.min_prevalence.to_bits(),
            correlation_threshold: params.correlation_threshold.to_bits(),
            max_p_value: params.max_p_value.map(f64::to_bits),
            feature_whitelist: params.feature_whitelist.clone(),
            class_filter: params.class_filter,
            resolution: params.resolution.to_bits(),
            seed: params.seed,
            fbm_sign_dominance: params.fbm_sign_dominance.to_bits(),
            population: population.map(population_fingerprint),
        }
    }
}

/// Content hash of the model terms in a population.
fn population_fingerprint(population: &ModelPopulation) -> u64 {
    let mut hasher = DefaultHasher::new();
    population.feature_names.hash(&mut hasher);
    for model in &population.models {
        model.k.hash(&mut hasher);
        for term in &model.features {
            term.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Cached entry point for every exploration computation.
pub struct Explorer {
    config: ExploreConfig,
    stats_cache: ResultCache<StatsKey, Arc<FeatureStatistics>>,
    network_cache: ResultCache<NetworkKey, Arc<CoabundanceGraph>>,
    annotator: Option<TaxonomyAnnotator>,
}

impl Explorer {
    pub fn new(config: ExploreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Explorer whose caches read time from `clock`.
    pub fn with_clock(config: ExploreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            stats_cache: ResultCache::new(&config.cache.feature_statistics, clock.clone()),
            network_cache: ResultCache::new(&config.cache.coabundance, clock),
            annotator: None,
            config,
        }
    }

    /// Attach a taxonomy source used to annotate network nodes.
    pub fn with_taxonomy(mut self, source: Arc<dyn TaxonomySource>) -> Result<Self> {
        self.annotator = Some(TaxonomyAnnotator::new(source, &self.config.taxonomy)?);
        Ok(self)
    }

    pub fn config(&self) -> &ExploreConfig {
        &self.config
    }

    pub fn feature_statistics(
        &self,
        dataset: &Dataset,
        params: &StatsParams,
    ) -> Arc<FeatureStatistics> {
        let key = StatsKey::new(dataset, params);
        if let Some(stats) = self.stats_cache.get(&key) {
            return stats;
        }
        log::debug!("Computing feature statistics for {}", dataset.id);
        let stats = Arc::new(feature_statistics(&dataset.matrix, &dataset.labels, params));
        self.stats_cache.insert(key, stats.clone());
        stats
    }

    pub fn boxplots(
        &self,
        dataset: &Dataset,
        feature_subset: Option<&[String]>,
        options: &BoxplotOptions,
    ) -> Vec<FeatureBoxplot> {
        boxplot_summary(&dataset.matrix, &dataset.labels, feature_subset, options)
    }

    pub fn barcode(
        &self,
        dataset: &Dataset,
        feature_subset: Option<&[String]>,
        options: &BarcodeOptions,
    ) -> BarcodeMatrix {
        barcode_matrix(&dataset.matrix, &dataset.labels, feature_subset, options)
    }

    pub fn ordination(
        &self,
        dataset: &Dataset,
        params: &OrdinationParams,
    ) -> Result<OrdinationResult> {
        ordinate(&dataset.matrix, &dataset.labels, params)
    }

    pub fn coabundance_network(
        &self,
        dataset: &Dataset,
        params: &CoabundanceParams,
        population: Option<&ModelPopulation>,
    ) -> Result<Arc<CoabundanceGraph>> {
        let key = NetworkKey::new(dataset, params, population);
        self.network_cache.get_or_try_compute(&key, || {
            log::debug!("Computing co-abundance network for {}", dataset.id);
            compute_coabundance_network(
                &dataset.matrix,
                &dataset.labels,
                params,
                self.annotator.as_ref(),
                population,
            )
            .map(Arc::new)
        })
    }

    pub fn stability(
        &self,
        population: &ModelPopulation,
        params: &StabilityParams,
    ) -> StabilityReport {
        compute_stability_analysis(population, params)
    }

    /// Statistics of the feature-statistics and co-abundance caches.
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.stats_cache.stats(), self.network_cache.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeClock;
    use std::time::Duration;

    fn create_dataset() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let x = i as f64 + 1.0;
                vec![x, x * 2.0, 11.0 - x, ((i * 3) % 10) as f64]
            })
            .collect();
        let samples: Vec<String> = (0..10).map(|i| format!("S{}", i)).collect();
        let matrix = AbundanceMatrix::from_rows(
            &rows,
            samples.clone(),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        )
        .unwrap();
        let labels = ClassLabels::new(samples, (0..10).map(|i| (i % 2) as i64).collect()).unwrap();
        Dataset::new("test", matrix, labels)
    }

    #[test]
    fn test_feature_statistics_cached() {
        let explorer = Explorer::new(ExploreConfig::default());
        let dataset = create_dataset();
        let params = StatsParams::default();
        let first = explorer.feature_statistics(&dataset, &params);
        let second = explorer.feature_statistics(&dataset, &params);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(explorer.cache_stats().0.hits, 1);

        let other = explorer.feature_statistics(
            &dataset,
            &StatsParams {
                alpha: 0.01,
                ..Default::default()
            },
        );
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_network_recomputed_after_ttl() {
        let clock = Arc::new(FakeClock::new());
        let explorer = Explorer::with_clock(ExploreConfig::default(), clock.clone());
        let dataset = create_dataset();
        let params = CoabundanceParams::default();

        let first = explorer.coabundance_network(&dataset, &params, None).unwrap();
        clock.advance(Duration::from_secs(599));
        let cached = explorer.coabundance_network(&dataset, &params, None).unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        clock.advance(Duration::from_secs(2));
        let fresh = explorer.coabundance_network(&dataset, &params, None).unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(*first, *fresh);
    }

    #[test]
    fn test_population_changes_key() {
        let explorer = Explorer::new(ExploreConfig::default());
        let dataset = create_dataset();
        let params = CoabundanceParams::default();
        let population = ModelPopulation::new(vec!["a".into()], Vec::new());
        let without = explorer.coabundance_network(&dataset, &params, None).unwrap();
        let with = explorer
            .coabundance_network(&dataset, &params, Some(&population))
            .unwrap();
        assert!(!Arc::ptr_eq(&without, &with));
    }
}
