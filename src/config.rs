//! Explorer configuration, loaded from YAML.
//!
//! Every section and field has a default, so a configuration file only needs
//! the values it changes:
//!
//! ```yaml
//! ordination:
//!   metric: jaccard
//!   n_permutations: 499
//! network:
//!   correlation_threshold: 0.6
//! ```

use crate::cache::CacheSettings;
use crate::error::Result;
use crate::network::{CoabundanceParams, TaxonomyConfig};
use crate::ordination::OrdinationParams;
use crate::stability::StabilityParams;
use crate::stats::{BarcodeOptions, BoxplotOptions, StatsParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// TTLs and capacities of the service caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub feature_statistics: CacheSettings,
    pub coabundance: CacheSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feature_statistics: CacheSettings {
                ttl_secs: 300,
                capacity: 128,
            },
            coabundance: CacheSettings {
                ttl_secs: 600,
                capacity: 64,
            },
        }
    }
}

/// Complete explorer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    pub stats: StatsParams,
    pub boxplot: BoxplotOptions,
    pub barcode: BarcodeOptions,
    pub ordination: OrdinationParams,
    pub network: CoabundanceParams,
    pub stability: StabilityParams,
    pub cache: CacheConfig,
    pub taxonomy: TaxonomyConfig,
}

impl ExploreConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.ordination.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "ordination:\n  metric: jaccard\nnetwork:\n  correlation_threshold: 0.6\n";
        let config = ExploreConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ordination.metric, "jaccard");
        assert_eq!(config.ordination.n_permutations, 999);
        assert_eq!(config.network.correlation_threshold, 0.6);
        assert_eq!(config.network.min_prevalence, 10.0);
        assert_eq!(config.stability.cut_distance, 0.7);
        assert_eq!(config.cache.coabundance.ttl_secs, 600);
        assert_eq!(config.taxonomy.max_concurrency, 20);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = ExploreConfig::default();
        config.stats.alpha = 0.01;
        config.network.max_p_value = Some(0.05);
        let parsed = ExploreConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file_and_validation() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ordination:\n  confidence: 2.0").unwrap();
        file.flush().unwrap();
        assert!(ExploreConfig::from_file(file.path()).is_err());
    }
}
