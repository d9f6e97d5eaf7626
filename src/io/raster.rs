use crate::types::{ClassCode, ClassifiedStack, GeoTransform, LuccError, LuccResult};
use chrono::NaiveDate;
use gdal::{Dataset, Metadata};
use ndarray::Array3;
use std::path::Path;

/// All bands of a raster file, decoded to class codes
#[derive(Debug, Clone)]
pub struct RasterLayers {
    /// Values indexed as (band, row, col); nodata and NaN cells are `None`
    pub data: Array3<Option<ClassCode>>,
    pub geo_transform: GeoTransform,
    pub projection: String,
    /// Band descriptions, empty when the file carries none
    pub names: Vec<String>,
}

/// Read every band of a raster file
pub fn read_layers<P: AsRef<Path>>(path: P) -> LuccResult<RasterLayers> {
    let path = path.as_ref();
    log::info!("Reading raster layers from: {}", path.display());

    if !path.exists() {
        return Err(LuccError::NotFound(path.display().to_string()));
    }

    let dataset = Dataset::open(path)?;
    let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count() as usize;

    log::debug!("Raster size: {}x{} with {} bands", width, height, band_count);

    let mut values = Vec::with_capacity(band_count * width * height);
    let mut names = Vec::with_capacity(band_count);
    for band_index in 1..=band_count {
        let rasterband = dataset.rasterband(band_index as isize)?;
        let nodata = rasterband.no_data_value();
        let band_data = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

        values.extend(band_data.data.into_iter().map(|v| {
            if v.is_nan() || nodata.map_or(false, |nd| v == nd) {
                None
            } else {
                Some(v.round() as ClassCode)
            }
        }));
        names.push(rasterband.description().unwrap_or_default());
    }

    let data = Array3::from_shape_vec((band_count, height, width), values)?;

    Ok(RasterLayers {
        data,
        geo_transform,
        projection: dataset.projection(),
        names,
    })
}

impl ClassifiedStack {
    /// Load a multi-layer classified raster and attach its timeline
    pub fn from_file<P: AsRef<Path>>(path: P, timeline: Vec<NaiveDate>) -> LuccResult<Self> {
        let layers = read_layers(path)?;
        ClassifiedStack::new(layers.data, layers.geo_transform, layers.projection, timeline)
    }
}
