//! Sample distances and feature correlations.

mod correlation;
mod metric;

pub use correlation::{
    correlation_matrix, correlation_p_value, spearman, CorrelationMatrix,
    PAIRWISE_FEATURE_THRESHOLD,
};
pub use metric::{
    bray_curtis, cosine, distance_matrix, jaccard, pairwise, DistanceMatrix,
    DistanceMatrixPayload, DistanceMetric,
};
