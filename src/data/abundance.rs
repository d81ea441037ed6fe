//! Dense abundance matrix for sample × feature omics data.

use crate::error::{ExploreError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A dense abundance matrix storing feature values across samples.
///
/// Rows represent samples, columns represent features, regardless of the
/// orientation of the file it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceMatrix {
    /// Dense matrix (samples × features).
    data: DMatrix<f64>,
    /// Sample identifiers (row names).
    sample_ids: Vec<String>,
    /// Feature identifiers (column names).
    feature_ids: Vec<String>,
}

impl AbundanceMatrix {
    /// Create a new AbundanceMatrix from a dense matrix and identifiers.
    pub fn new(
        data: DMatrix<f64>,
        sample_ids: Vec<String>,
        feature_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != sample_ids.len() {
            return Err(ExploreError::DimensionMismatch {
                expected: nrows,
                actual: sample_ids.len(),
            });
        }
        if ncols != feature_ids.len() {
            return Err(ExploreError::DimensionMismatch {
                expected: ncols,
                actual: feature_ids.len(),
            });
        }
        check_unique(&sample_ids)?;
        check_unique(&feature_ids)?;
        Ok(Self {
            data,
            sample_ids,
            feature_ids,
        })
    }

    /// Build a matrix from row-major sample rows.
    pub fn from_rows(
        rows: &[Vec<f64>],
        sample_ids: Vec<String>,
        feature_ids: Vec<String>,
    ) -> Result<Self> {
        let n_features = feature_ids.len();
        let mut flat = Vec::with_capacity(rows.len() * n_features);
        for row in rows {
            if row.len() != n_features {
                return Err(ExploreError::DimensionMismatch {
                    expected: n_features,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let data = DMatrix::from_row_slice(rows.len(), n_features, &flat);
        Self::new(data, sample_ids, feature_ids)
    }

    /// Load an abundance table from a tab- or comma-delimited file.
    ///
    /// Expected format:
    /// - First row: header (first cell names the identifier column)
    /// - Subsequent rows: row identifier followed by numeric values
    ///
    /// When `features_in_rows` is true the rows of the file are features and
    /// the header lists samples; the matrix is transposed on load.
    pub fn from_delimited<P: AsRef<Path>>(path: P, features_in_rows: bool) -> Result<Self> {
        let table = read_numeric_table(path.as_ref())?;
        let n_rows = table.row_ids.len();
        let n_cols = table.column_ids.len();
        let file_matrix = DMatrix::from_row_slice(n_rows, n_cols, &table.values);

        if features_in_rows {
            Self::new(file_matrix.transpose(), table.column_ids, table.row_ids)
        } else {
            Self::new(file_matrix, table.row_ids, table.column_ids)
        }
    }

    /// Get the value at (sample, feature).
    #[inline]
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.data[(sample, feature)]
    }

    /// Number of samples (rows).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of features (columns).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Feature identifiers.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Get the underlying dense matrix.
    #[inline]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Position of a feature by name.
    pub fn feature_index(&self, feature_id: &str) -> Option<usize> {
        self.feature_ids.iter().position(|f| f == feature_id)
    }

    /// Dense values of one feature across all samples.
    pub fn feature_values(&self, feature: usize) -> Vec<f64> {
        self.data.column(feature).iter().copied().collect()
    }

    /// Dense values of one sample across all features.
    pub fn sample_values(&self, sample: usize) -> Vec<f64> {
        self.data.row(sample).iter().copied().collect()
    }

    /// All samples as row vectors.
    pub fn sample_rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_samples()).map(|i| self.sample_values(i)).collect()
    }

    /// Fraction of samples with a value strictly greater than zero, per feature.
    pub fn prevalence(&self) -> Vec<f64> {
        let n_samples = self.n_samples();
        (0..self.n_features())
            .into_par_iter()
            .map(|j| {
                if n_samples == 0 {
                    return 0.0;
                }
                let present = self.data.column(j).iter().filter(|&&v| v > 0.0).count();
                present as f64 / n_samples as f64
            })
            .collect()
    }

    /// Mean value per feature.
    pub fn feature_means(&self) -> Vec<f64> {
        let n_samples = self.n_samples();
        (0..self.n_features())
            .map(|j| {
                if n_samples == 0 {
                    0.0
                } else {
                    self.data.column(j).sum() / n_samples as f64
                }
            })
            .collect()
    }

    /// Subset the matrix to the specified samples (by index, in the given order).
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        for &i in indices {
            if i >= self.n_samples() {
                return Err(ExploreError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    i
                )));
            }
        }
        let data = self.data.select_rows(indices.iter());
        let sample_ids = indices.iter().map(|&i| self.sample_ids[i].clone()).collect();
        Ok(Self {
            data,
            sample_ids,
            feature_ids: self.feature_ids.clone(),
        })
    }

    /// Subset the matrix to the specified features (by index, in the given order).
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        for &j in indices {
            if j >= self.n_features() {
                return Err(ExploreError::InvalidParameter(format!(
                    "Feature index {} out of bounds",
                    j
                )));
            }
        }
        let data = self.data.select_columns(indices.iter());
        let feature_ids = indices.iter().map(|&j| self.feature_ids[j].clone()).collect();
        Ok(Self {
            data,
            sample_ids: self.sample_ids.clone(),
            feature_ids,
        })
    }
}

fn check_unique(ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(ExploreError::DuplicateId(id.clone()));
        }
    }
    Ok(())
}

/// A delimited table whose body cells are still strings.
pub(crate) struct RawTable {
    pub column_ids: Vec<String>,
    pub row_ids: Vec<String>,
    pub cells: Vec<Vec<String>>,
}

/// A delimited table with parsed numeric body (row-major).
struct NumericTable {
    column_ids: Vec<String>,
    row_ids: Vec<String>,
    values: Vec<f64>,
}

/// Pick the delimiter from the extension, falling back to sniffing the header.
pub(crate) fn detect_delimiter(path: &Path) -> Result<u8> {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) {
        Some(ext) if ext == "csv" => return Ok(b','),
        Some(ext) if ext == "tsv" || ext == "tab" => return Ok(b'\t'),
        _ => {}
    }

    let mut first_line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first_line)?;
    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    Ok(if commas > tabs { b',' } else { b'\t' })
}

/// Read a delimited table keeping body cells as strings.
pub(crate) fn read_raw_table(path: &Path) -> Result<RawTable> {
    let delimiter = detect_delimiter(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let header = reader.headers()?.clone();
    if header.len() < 2 {
        return Err(ExploreError::EmptyData(format!(
            "{} must have an identifier column and at least one value column",
            path.display()
        )));
    }
    let column_ids: Vec<String> = header.iter().skip(1).map(String::from).collect();

    let mut row_ids = Vec::new();
    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        let mut fields = record.iter();
        let row_id = fields.next().unwrap_or_default().to_string();
        let values: Vec<String> = fields.map(String::from).collect();
        if values.len() != column_ids.len() {
            return Err(ExploreError::DimensionMismatch {
                expected: column_ids.len(),
                actual: values.len(),
            });
        }
        row_ids.push(row_id);
        cells.push(values);
    }

    if row_ids.is_empty() {
        return Err(ExploreError::EmptyData(format!(
            "No data rows in {}",
            path.display()
        )));
    }

    Ok(RawTable {
        column_ids,
        row_ids,
        cells,
    })
}

fn read_numeric_table(path: &Path) -> Result<NumericTable> {
    let raw = read_raw_table(path)?;
    let mut values = Vec::with_capacity(raw.row_ids.len() * raw.column_ids.len());
    for (row, cells) in raw.cells.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            let value: f64 = cell.parse().map_err(|_| ExploreError::InvalidValue {
                value: cell.clone(),
                row,
                col,
            })?;
            values.push(value);
        }
    }
    Ok(NumericTable {
        column_ids: raw.column_ids,
        row_ids: raw.row_ids,
        values,
    })
}
