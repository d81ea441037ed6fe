//! Taxonomic annotation of network nodes and family color assignment.
//!
//! Lookups go through a [`TaxonomySource`] collaborator. The annotator fans
//! requests out over a fixed-size rayon pool; any lookup that fails, returns
//! nothing or answers after its timeout leaves the feature unannotated.

use crate::data::read_raw_table;
use crate::error::{ExploreError, Result};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Color for nodes without a usable taxonomy.
pub const UNKNOWN_COLOR: &str = "#9e9e9e";

/// Phyla in color-priority order; aliases share a hue.
const PHYLUM_PRIORITY: &[(&[&str], f64)] = &[
    (&["Firmicutes", "Bacillota"], 210.0),
    (&["Bacteroidetes", "Bacteroidota"], 25.0),
    (&["Proteobacteria", "Pseudomonadota"], 120.0),
    (&["Actinobacteria", "Actinobacteriota", "Actinomycetota"], 280.0),
    (&["Verrucomicrobia", "Verrucomicrobiota"], 50.0),
    (&["Fusobacteria", "Fusobacteriota"], 340.0),
    (&["Euryarchaeota", "Methanobacteriota"], 180.0),
    (&["Tenericutes", "Mycoplasmatota"], 0.0),
];

/// Hues handed out to phyla outside the priority list, alphabetically.
const FALLBACK_HUES: &[f64] = &[90.0, 150.0, 240.0, 310.0, 10.0, 65.0, 195.0, 265.0];

const SATURATION: f64 = 0.65;
const LIGHTNESS_MIN: f64 = 0.35;
const LIGHTNESS_MAX: f64 = 0.75;

/// Taxonomic ranks of one feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taxonomy {
    pub phylum: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub species: Option<String>,
}

impl Taxonomy {
    /// True when no rank is known.
    pub fn is_empty(&self) -> bool {
        self.phylum.is_none() && self.family.is_none() && self.genus.is_none() && self.species.is_none()
    }
}

/// External taxonomy collaborator.
pub trait TaxonomySource: Send + Sync {
    /// Look up one feature. `Ok(None)` means the feature is unknown.
    fn lookup(&self, feature_id: &str, timeout: Duration) -> Result<Option<Taxonomy>>;
}

/// Taxonomy table read from a delimited file.
///
/// The first column holds feature IDs; the remaining header names are
/// matched case-insensitively against `phylum`, `family`, `genus` and
/// `species`. Empty and `NA` cells are unknown ranks.
#[derive(Debug, Clone, Default)]
pub struct TableTaxonomySource {
    entries: HashMap<String, Taxonomy>,
}

impl TableTaxonomySource {
    pub fn new(entries: HashMap<String, Taxonomy>) -> Self {
        Self { entries }
    }

    pub fn from_delimited<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = read_raw_table(path.as_ref())?;
        let rank_column = |rank: &str| {
            table
                .column_ids
                .iter()
                .position(|c| c.eq_ignore_ascii_case(rank))
        };
        let (phylum, family, genus, species) = (
            rank_column("phylum"),
            rank_column("family"),
            rank_column("genus"),
            rank_column("species"),
        );
        if phylum.is_none() && family.is_none() && genus.is_none() {
            return Err(ExploreError::InvalidParameter(
                "taxonomy table needs a phylum, family or genus column".to_string(),
            ));
        }

        let pick = |row: &[String], col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("na"))
                .map(str::to_string)
        };

        let entries = table
            .row_ids
            .iter()
            .zip(&table.cells)
            .map(|(id, row)| {
                (
                    id.clone(),
                    Taxonomy {
                        phylum: pick(row, phylum),
                        family: pick(row, family),
                        genus: pick(row, genus),
                        species: pick(row, species),
                    },
                )
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TaxonomySource for TableTaxonomySource {
    fn lookup(&self, feature_id: &str, _timeout: Duration) -> Result<Option<Taxonomy>> {
        Ok(self.entries.get(feature_id).cloned())
    }
}

/// Annotation pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Concurrent lookups in flight.
    pub max_concurrency: usize,
    /// Per-lookup timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional taxonomy table for the CLI.
    pub table: Option<String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            timeout_ms: 5000,
            table: None,
        }
    }
}

/// Bounded parallel annotator over a taxonomy source.
pub struct TaxonomyAnnotator {
    source: Arc<dyn TaxonomySource>,
    pool: ThreadPool,
    concurrency: usize,
    timeout: Duration,
}

impl TaxonomyAnnotator {
    pub fn new(source: Arc<dyn TaxonomySource>, config: &TaxonomyConfig) -> Result<Self> {
        let concurrency = config.max_concurrency.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("taxonomy-{}", i))
            .build()
            .map_err(|e| {
                ExploreError::InvalidParameter(format!("failed to build taxonomy pool: {}", e))
            })?;
        Ok(Self {
            source,
            pool,
            concurrency,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Annotate features; unresolved features are absent from the map.
    ///
    /// The caller waits at most one timeout per wave of `max_concurrency`
    /// lookups. Answers after that deadline, or slower than the timeout
    /// themselves, are dropped; a hung lookup keeps its pool thread busy.
    pub fn annotate(&self, feature_ids: &[String]) -> HashMap<String, Taxonomy> {
        let mut found = HashMap::new();
        if feature_ids.is_empty() {
            return found;
        }

        let (tx, rx) = mpsc::channel();
        for id in feature_ids {
            let source = Arc::clone(&self.source);
            let tx = tx.clone();
            let id = id.clone();
            let timeout = self.timeout;
            self.pool.spawn(move || {
                let started = Instant::now();
                let result = source.lookup(&id, timeout);
                let late = started.elapsed() > timeout;
                // the receiver is gone once the caller's deadline has passed
                let _ = tx.send((id, result, late));
            });
        }
        drop(tx);

        let waves = (feature_ids.len() + self.concurrency - 1) / self.concurrency;
        let deadline = Instant::now().checked_add(self.timeout.saturating_mul(waves as u32));
        let mut answered = 0;
        while answered < feature_ids.len() {
            let received = match deadline {
                Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let (id, result, late) = match received {
                Ok(answer) => answer,
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!(
                        "Taxonomy lookups timed out with {} of {} answered",
                        answered,
                        feature_ids.len()
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            answered += 1;
            if late {
                log::debug!("Taxonomy lookup for '{}' timed out", id);
                continue;
            }
            match result {
                Ok(Some(taxonomy)) if !taxonomy.is_empty() => {
                    found.insert(id, taxonomy);
                }
                Ok(_) => {}
                Err(e) => log::debug!("Taxonomy lookup for '{}' failed: {}", id, e),
            }
        }

        log::debug!(
            "Annotated {} of {} features with taxonomy",
            found.len(),
            feature_ids.len()
        );
        found
    }
}

/// One legend row: a family and its color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub phylum: String,
    pub family: String,
    pub color: String,
    /// Annotated features in this family.
    pub count: usize,
}

/// Family colors plus per-phylum base colors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorLegend {
    pub entries: Vec<LegendEntry>,
    pub phylum_colors: BTreeMap<String, String>,
}

impl ColorLegend {
    /// Color of a taxonomy: its family color, else its phylum color, else gray.
    pub fn color_for(&self, taxonomy: Option<&Taxonomy>) -> String {
        let Some(t) = taxonomy else {
            return UNKNOWN_COLOR.to_string();
        };
        if let (Some(phylum), Some(family)) = (&t.phylum, &t.family) {
            if let Some(entry) = self
                .entries
                .iter()
                .find(|e| &e.phylum == phylum && &e.family == family)
            {
                return entry.color.clone();
            }
        }
        t.phylum
            .as_ref()
            .and_then(|p| self.phylum_colors.get(p))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_COLOR.to_string())
    }
}

fn priority_hue(phylum: &str) -> Option<(usize, f64)> {
    PHYLUM_PRIORITY
        .iter()
        .enumerate()
        .find(|(_, (names, _))| names.iter().any(|n| n.eq_ignore_ascii_case(phylum)))
        .map(|(rank, &(_, hue))| (rank, hue))
}

/// Assign colors: one hue per phylum by priority, with family lightness
/// graded from dark (most frequent) to light across each phylum.
pub fn build_color_legend<'a>(taxa: impl IntoIterator<Item = &'a Taxonomy>) -> ColorLegend {
    let mut families: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for t in taxa {
        if let Some(phylum) = &t.phylum {
            let per_phylum = families.entry(phylum.clone()).or_default();
            if let Some(family) = &t.family {
                *per_phylum.entry(family.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut phyla: Vec<&String> = families.keys().collect();
    phyla.sort_by(|a, b| {
        let ra = priority_hue(a).map_or(usize::MAX, |(r, _)| r);
        let rb = priority_hue(b).map_or(usize::MAX, |(r, _)| r);
        ra.cmp(&rb).then(a.cmp(b))
    });

    let mut legend = ColorLegend::default();
    let mut fallback = FALLBACK_HUES.iter().cycle();
    for phylum in phyla {
        let hue = match priority_hue(phylum) {
            Some((_, hue)) => hue,
            None => fallback.next().copied().unwrap_or(0.0),
        };
        legend
            .phylum_colors
            .insert(phylum.clone(), hsl_to_hex(hue, SATURATION, 0.5));

        let mut ranked: Vec<(&String, &usize)> = families[phylum].iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let steps = ranked.len().saturating_sub(1).max(1) as f64;
        for (i, (family, &count)) in ranked.into_iter().enumerate() {
            let lightness = LIGHTNESS_MIN + (LIGHTNESS_MAX - LIGHTNESS_MIN) * i as f64 / steps;
            legend.entries.push(LegendEntry {
                phylum: phylum.clone(),
                family: family.clone(),
                color: hsl_to_hex(hue, SATURATION, lightness),
                count,
            });
        }
    }
    legend
}

/// HSL (hue in degrees, saturation and lightness in [0, 1]) to `#rrggbb`.
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}
