//! Error types for the omics-explore library.

use thiserror::Error;

/// Main error type for the library.
///
/// Only genuine input-contract violations are represented here. Computations
/// that are merely undefined for an edge case (too few samples, degenerate
/// eigenvalues, unsupported metric) resolve into well-formed empty results
/// instead of returning an error.
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid numeric value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Invalid class label '{value}' for sample '{sample}'")]
    InvalidLabel { value: String, sample: String },

    #[error("Duplicate identifier '{0}'")]
    DuplicateId(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No common samples between abundance matrix ({matrix_samples} samples) and labels ({label_samples} samples)")]
    AlignmentEmpty {
        matrix_samples: usize,
        label_samples: usize,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ExploreError>;
