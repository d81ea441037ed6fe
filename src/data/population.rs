//! Candidate models produced by the external sparse-model-discovery engine.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Performance metrics attached to a candidate model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default)]
    pub auc: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub sensitivity: f64,
    #[serde(default)]
    pub specificity: f64,
    /// Any additional numeric metrics reported by the engine.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, f64>,
}

/// One (feature, coefficient) term of a candidate model.
///
/// A term is identified by name when the engine reports one, otherwise by
/// its index into the population's feature-name dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelFeature {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub name: Option<String>,
    /// Signed integer coefficient (typically -1 or +1).
    pub coefficient: i64,
}

/// A candidate model returned by the discovery engine. Read-only input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateModel {
    /// Sparsity level; derived from the non-zero terms when absent.
    #[serde(default)]
    pub k: Option<usize>,
    pub features: Vec<ModelFeature>,
    #[serde(default)]
    pub metrics: ModelMetrics,
}

impl CandidateModel {
    /// Sparsity level of the model.
    pub fn sparsity(&self) -> usize {
        self.k
            .unwrap_or_else(|| self.features.iter().filter(|f| f.coefficient != 0).count())
    }

    /// Feature name -> coefficient for all non-zero terms.
    ///
    /// Names are preferred; unnamed terms are looked up in `feature_names`.
    /// Terms that resolve to neither are skipped.
    pub fn signed_features(&self, feature_names: &[String]) -> BTreeMap<String, i64> {
        let mut resolved = BTreeMap::new();
        for term in self.features.iter().filter(|f| f.coefficient != 0) {
            let name = term
                .name
                .clone()
                .or_else(|| term.index.and_then(|i| feature_names.get(i).cloned()));
            match name {
                Some(name) => {
                    resolved.insert(name, term.coefficient);
                }
                None => log::debug!("Skipping unresolvable model term {:?}", term),
            }
        }
        resolved
    }

    /// Set of selected feature names.
    pub fn feature_set(&self, feature_names: &[String]) -> BTreeSet<String> {
        self.signed_features(feature_names).into_keys().collect()
    }
}

/// The family of best models for one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPopulation {
    /// Feature-name dictionary shared by index-based model terms.
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub models: Vec<CandidateModel>,
}

/// A model reduced to what the stability engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub k: usize,
    pub features: BTreeMap<String, i64>,
    pub metrics: ModelMetrics,
}

impl ResolvedModel {
    /// Selected feature names.
    pub fn feature_set(&self) -> BTreeSet<&str> {
        self.features.keys().map(String::as_str).collect()
    }
}

impl ModelPopulation {
    /// Create a population from a dictionary and models.
    pub fn new(feature_names: Vec<String>, models: Vec<CandidateModel>) -> Self {
        Self {
            feature_names,
            models,
        }
    }

    /// Parse a population from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a population from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if the population is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve every model's terms against the dictionary.
    pub fn resolved(&self) -> Vec<ResolvedModel> {
        self.models
            .iter()
            .map(|m| ResolvedModel {
                k: m.sparsity(),
                features: m.signed_features(&self.feature_names),
                metrics: m.metrics.clone(),
            })
            .collect()
    }

    /// Size of the feature universe used for chance correction.
    ///
    /// The dictionary size when one is supplied, otherwise the number of
    /// distinct features selected anywhere in the population.
    pub fn universe_size(&self) -> usize {
        if !self.feature_names.is_empty() {
            return self.feature_names.len();
        }
        self.models
            .iter()
            .flat_map(|m| m.feature_set(&self.feature_names))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_population_json() {
        let json = r#"{
            "feature_names": ["a", "b", "c"],
            "models": [
                {"k": 2, "features": [{"index": 0, "coefficient": 1}, {"index": 2, "coefficient": -1}],
                 "metrics": {"auc": 0.8, "accuracy": 0.75, "fit": 0.7}},
                {"features": [{"name": "b", "coefficient": 1}, {"index": 1, "coefficient": 0}]}
            ]
        }"#;
        let pop = ModelPopulation::from_json_str(json).unwrap();
        assert_eq!(pop.len(), 2);
        assert_eq!(pop.models[0].metrics.extra.get("fit"), Some(&0.7));

        let resolved = pop.resolved();
        assert_eq!(resolved[0].k, 2);
        assert_eq!(resolved[0].features.get("c"), Some(&-1));
        // k derived from non-zero terms
        assert_eq!(resolved[1].k, 1);
        assert_eq!(resolved[1].feature_set().into_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_names_preferred_over_indices() {
        let model = CandidateModel {
            k: Some(1),
            features: vec![ModelFeature {
                index: Some(0),
                name: Some("named".into()),
                coefficient: 1,
            }],
            metrics: ModelMetrics::default(),
        };
        let set = model.feature_set(&["dict".to_string()]);
        assert!(set.contains("named"));
        assert!(!set.contains("dict"));
    }

    #[test]
    fn test_unresolvable_terms_skipped() {
        let model = CandidateModel {
            k: None,
            features: vec![ModelFeature {
                index: Some(9),
                name: None,
                coefficient: 1,
            }],
            metrics: ModelMetrics::default(),
        };
        assert!(model.feature_set(&[]).is_empty());
    }

    #[test]
    fn test_universe_size() {
        let pop = ModelPopulation::new(vec!["a".into(), "b".into(), "c".into()], vec![]);
        assert_eq!(pop.universe_size(), 3);

        let model = CandidateModel {
            k: None,
            features: vec![
                ModelFeature { index: None, name: Some("x".into()), coefficient: 1 },
                ModelFeature { index: None, name: Some("y".into()), coefficient: -1 },
            ],
            metrics: ModelMetrics::default(),
        };
        let pop = ModelPopulation::new(vec![], vec![model]);
        assert_eq!(pop.universe_size(), 2);
    }
}
