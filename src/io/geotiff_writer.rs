use crate::types::{CellValue, ClassCode, ClassifiedStack, GeoTransform, LuccError, LuccResult, PixelMatrix};
use gdal::raster::Buffer;
use gdal::{DriverManager, Metadata};
use ndarray::{Array3, Axis};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Prefix of every GeoTIFF file written by this crate
pub const OUTPUT_PREFIX: &str = "New_";

/// Nodata value of 8-bit output rasters
pub const BYTE_NODATA: u8 = 255;

/// GeoTIFF output parameters
#[derive(Debug, Clone, Default)]
pub struct WriterParams {
    /// Write one multi-band file instead of one file per layer
    pub as_single_stack: bool,
}

/// Layer name from a column header: everything before the first period
pub fn layer_name(header: &str) -> &str {
    header.split('.').next().unwrap_or(header)
}

/// Class code as an 8-bit value, `None` when out of range or equal to nodata
pub(crate) fn code_to_byte(code: ClassCode) -> Option<u8> {
    num_traits::cast::<_, u8>(code).filter(|b| *b != BYTE_NODATA)
}

/// Place the rows of a wide pixel table on the reference grid as 8-bit layers
pub fn rasterize_table(
    table: &PixelMatrix,
    geo_transform: &GeoTransform,
    height: usize,
    width: usize,
) -> LuccResult<Array3<u8>> {
    let mut layers = Array3::from_elem((table.columns.len(), height, width), BYTE_NODATA);

    for pixel in &table.rows {
        table.check_row(pixel)?;
        let (row, col) = geo_transform
            .cell_index(pixel.x, pixel.y, height, width)
            .ok_or_else(|| {
                LuccError::Processing(format!(
                    "Coordinate ({}, {}) lies outside the {}x{} reference grid",
                    pixel.x, pixel.y, width, height
                ))
            })?;

        for (layer, value) in pixel.values.iter().enumerate() {
            let byte = match value {
                None => BYTE_NODATA,
                Some(CellValue::Code(code)) => code_to_byte(*code).ok_or_else(|| {
                    LuccError::Processing(format!(
                        "Class code {} cannot be stored as an 8-bit value (0-254)",
                        code
                    ))
                })?,
                Some(CellValue::Label(label)) => {
                    return Err(LuccError::Processing(format!(
                        "Cannot write class label '{}' to a raster, resolve labels to codes first",
                        label
                    )))
                }
            };
            layers[[layer, row, col]] = byte;
        }
    }

    Ok(layers)
}

/// Write 8-bit layers into one GeoTIFF, one band per layer
pub(crate) fn write_byte_bands(
    output_path: &Path,
    layers: &Array3<u8>,
    names: &[&str],
    geo_transform: &GeoTransform,
    projection: &str,
) -> LuccResult<()> {
    log::debug!("Writing {} bands to {}", names.len(), output_path.display());

    let (band_count, height, width) = layers.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<u8, _>(
        output_path,
        width as isize,
        height as isize,
        band_count as isize,
    )?;

    dataset.set_geo_transform(&geo_transform.to_gdal())?;
    if !projection.is_empty() {
        dataset.set_projection(projection)?;
    }

    for (i, (layer, name)) in layers.axis_iter(Axis(0)).zip(names).enumerate() {
        let mut rasterband = dataset.rasterband((i + 1) as isize)?;
        rasterband.set_no_data_value(Some(BYTE_NODATA as f64))?;
        let buffer = Buffer::new((width, height), layer.iter().copied().collect());
        rasterband.write((0, 0), (width, height), &buffer)?;
        rasterband.set_description(name)?;
    }

    Ok(())
}

/// Write a wide pixel table as GeoTIFF, reusing the grid and CRS of `reference`.
///
/// Files are named `New_<layer>.tif`, or `New_<output dir name>.tif` for a
/// single multi-band file. Existing files are overwritten. Returns the paths
/// written.
pub fn write_geotiff<P: AsRef<Path>>(
    reference: &ClassifiedStack,
    table: &PixelMatrix,
    output_dir: P,
    params: &WriterParams,
) -> LuccResult<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    if output_dir.as_os_str().is_empty() {
        return Err(LuccError::Validation("Missing output directory".to_string()));
    }
    if table.columns.is_empty() {
        return Err(LuccError::Validation("Pixel table has no layer columns".to_string()));
    }

    let names: Vec<&str> = table.columns.iter().map(|c| layer_name(c)).collect();
    if !params.as_single_stack {
        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(**name)) {
            return Err(LuccError::Validation(format!(
                "Several columns map to layer name '{}', their files would overwrite each other",
                duplicate
            )));
        }
    }

    log::info!(
        "Writing {} layers to {} ({})",
        table.columns.len(),
        output_dir.display(),
        if params.as_single_stack { "single stack" } else { "one file per layer" }
    );

    std::fs::create_dir_all(output_dir)?;

    let (height, width) = reference.grid_size();
    let layers = rasterize_table(table, &reference.geo_transform, height, width)?;

    let mut written = Vec::new();
    if params.as_single_stack {
        let dir_name = output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                LuccError::Validation(format!(
                    "Cannot derive a file name from output directory {}",
                    output_dir.display()
                ))
            })?;
        let path = output_dir.join(format!("{}{}.tif", OUTPUT_PREFIX, dir_name));
        write_byte_bands(&path, &layers, &names, &reference.geo_transform, &reference.projection)?;
        written.push(path);
    } else {
        for (i, name) in names.iter().enumerate() {
            let path = output_dir.join(format!("{}{}.tif", OUTPUT_PREFIX, name));
            let layer = layers.slice(ndarray::s![i..i + 1, .., ..]).to_owned();
            write_byte_bands(&path, &layer, &[*name], &reference.geo_transform, &reference.projection)?;
            written.push(path);
        }
    }

    log::info!("Wrote {} GeoTIFF files", written.len());
    Ok(written)
}
