//! Raster I/O through GDAL

pub mod raster;
pub mod geotiff_writer;
pub mod brick_split;

pub use raster::{read_layers, RasterLayers};
pub use geotiff_writer::{layer_name, rasterize_table, write_geotiff, WriterParams, BYTE_NODATA, OUTPUT_PREFIX};
pub use brick_split::{split_layers, split_output_dir};
