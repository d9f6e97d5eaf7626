//! Table algorithms: frequency extraction, statistical measures and patch merging

pub mod frequency;
pub mod measures;
pub mod patch_merge;

// Re-export main types
pub use frequency::{extract_frequency, frequency_from_matrix, tabulate_matrix, ExtractParams};
pub use measures::{compute_measures, MeasuresParams};
pub use patch_merge::{merge_patch, resolve_label};
