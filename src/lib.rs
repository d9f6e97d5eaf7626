//! lucc: statistics and raster export for land-use change analysis
//!
//! Turns classified raster time series (one categorical layer per date) and
//! the pixel tables derived from them into per-class frequency and area
//! statistics, merges pixel-level edits back into a raster stack, and writes
//! the result out as GeoTIFF.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    CellValue, ClassCode, ClassifiedStack, FrequencyRow, FrequencyTable, GeoTransform, LuccError,
    LuccResult, MeasuresRow, MeasuresTable, MergedRasterTable, MergedRow, PixelMatrix, PixelRow,
    COORDINATE_PRECISION,
};

pub use crate::core::{
    compute_measures, extract_frequency, merge_patch, ExtractParams, MeasuresParams,
};

pub use crate::io::{read_layers, split_layers, write_geotiff, WriterParams};
