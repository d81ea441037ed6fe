//! Class labels assigning an integer class code to each sample.

use super::abundance::read_raw_table;
use crate::error::{ExploreError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Class membership for a list of samples.
///
/// Class codes are arbitrary small integers; nothing here assumes exactly
/// two classes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassLabels {
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Class code per sample (same order as `sample_ids`).
    classes: Vec<i64>,
    /// Sample ID -> position.
    index: HashMap<String, usize>,
}

impl ClassLabels {
    /// Create labels from parallel vectors of sample IDs and class codes.
    pub fn new(sample_ids: Vec<String>, classes: Vec<i64>) -> Result<Self> {
        if sample_ids.len() != classes.len() {
            return Err(ExploreError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: classes.len(),
            });
        }
        let mut index = HashMap::with_capacity(sample_ids.len());
        for (i, id) in sample_ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(ExploreError::DuplicateId(id.clone()));
            }
        }
        Ok(Self {
            sample_ids,
            classes,
            index,
        })
    }

    /// Load labels from a delimited file.
    ///
    /// Expected format:
    /// - First row: header (first column is sample ID)
    /// - Subsequent rows: sample ID followed by an integer class code
    ///
    /// Only the first value column is used. Codes written as `1.0` are accepted.
    pub fn from_delimited<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = read_raw_table(path.as_ref())?;
        let mut classes = Vec::with_capacity(table.row_ids.len());
        for (sample, cells) in table.row_ids.iter().zip(&table.cells) {
            let raw = cells.first().map(String::as_str).unwrap_or_default();
            classes.push(parse_class(raw).ok_or_else(|| ExploreError::InvalidLabel {
                value: raw.to_string(),
                sample: sample.clone(),
            })?);
        }
        Self::new(table.row_ids, classes)
    }

    /// Number of labelled samples.
    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    /// Check if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Class codes in sample order.
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Class code of a sample.
    pub fn get(&self, sample_id: &str) -> Option<i64> {
        self.index.get(sample_id).map(|&i| self.classes[i])
    }

    /// Distinct class codes in ascending order.
    pub fn distinct_classes(&self) -> Vec<i64> {
        let mut distinct: Vec<i64> = self.classes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        distinct
    }

    /// Sample positions grouped by class, classes ascending.
    pub fn class_indices(&self) -> BTreeMap<i64, Vec<usize>> {
        group_by_class(&self.classes)
    }

    /// Subset to the given positions (in the given order).
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        let mut sample_ids = Vec::with_capacity(indices.len());
        let mut classes = Vec::with_capacity(indices.len());
        for &i in indices {
            if i >= self.len() {
                return Err(ExploreError::InvalidParameter(format!(
                    "Label index {} out of bounds",
                    i
                )));
            }
            sample_ids.push(self.sample_ids[i].clone());
            classes.push(self.classes[i]);
        }
        Self::new(sample_ids, classes)
    }
}

/// Group positions by class code, classes ascending, positions in input order.
pub fn group_by_class(classes: &[i64]) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &c) in classes.iter().enumerate() {
        groups.entry(c).or_default().push(i);
    }
    groups
}

fn parse_class(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
        _ => None,
    }
}
