use crate::io::geotiff_writer::{code_to_byte, write_byte_bands, BYTE_NODATA, OUTPUT_PREFIX};
use crate::io::raster::read_layers;
use crate::types::{LuccError, LuccResult};
use ndarray::{s, Array3};
use std::path::{Path, PathBuf};

/// Directory that receives the split layers: a sibling named after the file stem
pub fn split_output_dir(input_file: &Path) -> LuccResult<PathBuf> {
    let stem = input_file.file_stem().ok_or_else(|| {
        LuccError::Validation(format!("Cannot derive a name from {}", input_file.display()))
    })?;
    if input_file.extension().is_none() {
        return Err(LuccError::Validation(format!(
            "{} has no file extension, its output directory would be the file itself",
            input_file.display()
        )));
    }
    let parent = input_file.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(stem))
}

/// Re-emit every band of a multi-layer raster as its own 8-bit GeoTIFF.
///
/// Output goes to a directory next to the input named after its stem, one
/// `New_<layer>.tif` per band. Returns the paths written.
pub fn split_layers<P: AsRef<Path>>(input_file: P) -> LuccResult<Vec<PathBuf>> {
    let input_file = input_file.as_ref();
    if !input_file.is_file() {
        return Err(LuccError::NotFound(input_file.display().to_string()));
    }

    let layers = read_layers(input_file)?;
    let output_dir = split_output_dir(input_file)?;
    std::fs::create_dir_all(&output_dir)?;

    let (band_count, height, width) = layers.data.dim();
    log::info!(
        "Splitting {} layers of {} into {}",
        band_count,
        input_file.display(),
        output_dir.display()
    );

    let mut written = Vec::with_capacity(band_count);
    for band in 0..band_count {
        let name = match layers.names.get(band) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("layer_{}", band + 1),
        };

        let mut bytes = Array3::from_elem((1, height, width), BYTE_NODATA);
        for ((_, row, col), value) in layers.data.slice(s![band..band + 1, .., ..]).indexed_iter() {
            if let Some(code) = value {
                bytes[[0, row, col]] = code_to_byte(*code).ok_or_else(|| {
                    LuccError::Processing(format!(
                        "Band {} holds value {} which does not fit an 8-bit raster",
                        band + 1,
                        code
                    ))
                })?;
            }
        }

        let path = output_dir.join(format!("{}{}.tif", OUTPUT_PREFIX, name));
        log::debug!("Writing band {} as {}", band + 1, path.display());
        write_byte_bands(&path, &bytes, &[name.as_str()], &layers.geo_transform, &layers.projection)?;
        written.push(path);
    }

    Ok(written)
}
