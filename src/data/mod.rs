//! Data structures for abundance exploration.

mod abundance;
mod labels;
pub mod loader;
mod population;

pub use abundance::AbundanceMatrix;
pub(crate) use abundance::read_raw_table;
pub use labels::{group_by_class, ClassLabels};
pub use loader::{align, load, stratified_indices, LoadOptions};
pub use population::{CandidateModel, ModelFeature, ModelMetrics, ModelPopulation, ResolvedModel};
