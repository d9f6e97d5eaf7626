use crate::core::frequency::frequency_from_matrix;
use crate::types::{
    CellValue, FrequencyRow, FrequencyTable, LuccError, LuccResult, MeasuresRow, MeasuresTable,
    PixelMatrix,
};
use std::collections::BTreeMap;

/// Square metres per square kilometre
const M2_PER_KM2: f64 = 1_000_000.0;

/// Statistical measures parameters
#[derive(Debug, Clone)]
pub struct MeasuresParams {
    /// Ground length of one pixel edge in meters
    pub pixel_resolution: Option<f64>,
}

impl Default for MeasuresParams {
    fn default() -> Self {
        Self {
            pixel_resolution: Some(250.0),
        }
    }
}

/// Compute area, cumulative area and relative frequencies per class.
///
/// Exactly one of `pixel_matrix` and `frequency_table` must be given. A pixel
/// matrix is first tabulated into (year, class, pixel count) triples.
pub fn compute_measures(
    pixel_matrix: Option<&PixelMatrix>,
    frequency_table: Option<&FrequencyTable>,
    params: &MeasuresParams,
) -> LuccResult<MeasuresTable> {
    let resolution = match params.pixel_resolution {
        Some(r) if r.is_finite() && r > 0.0 => r,
        Some(r) => {
            return Err(LuccError::Validation(format!(
                "Pixel resolution must be a positive number, got {}",
                r
            )))
        }
        None => {
            return Err(LuccError::Validation(
                "Missing pixel resolution".to_string(),
            ))
        }
    };

    let derived;
    let frequencies = match (pixel_matrix, frequency_table) {
        (Some(matrix), None) => {
            log::debug!("Deriving frequency table from a {}-row pixel matrix", matrix.rows.len());
            derived = frequency_from_matrix(matrix)?;
            &derived
        }
        (None, Some(table)) => table,
        (Some(_), Some(_)) => {
            return Err(LuccError::Validation(
                "Supply either a pixel matrix or a frequency table, not both".to_string(),
            ))
        }
        (None, None) => {
            return Err(LuccError::Validation(
                "Missing input: supply a pixel matrix or a frequency table".to_string(),
            ))
        }
    };

    log::info!(
        "Computing measures for {} frequency rows at {} m resolution",
        frequencies.rows.len(),
        resolution
    );

    let pixel_area_km2 = resolution * resolution / M2_PER_KM2;

    let mut by_class: BTreeMap<&CellValue, Vec<&FrequencyRow>> = BTreeMap::new();
    for row in &frequencies.rows {
        by_class.entry(&row.class).or_default().push(row);
    }

    let mut rows = Vec::with_capacity(frequencies.rows.len());
    for (class, mut class_rows) in by_class {
        class_rows.sort_by_key(|row| row.year);

        let areas: Vec<f64> = class_rows
            .iter()
            .map(|row| row.pixel_count as f64 * pixel_area_km2)
            .collect();

        let mut cumulative = Vec::with_capacity(areas.len());
        let mut running = 0.0;
        for area in &areas {
            running += area;
            cumulative.push(running);
        }
        let class_total = cumulative.iter().copied().fold(0.0, f64::max);

        let mut running_relative = 0.0;
        for ((row, area), cumulative_sum) in class_rows.iter().zip(&areas).zip(&cumulative) {
            let relative_frequency = if class_total > 0.0 {
                area / class_total * 100.0
            } else {
                0.0
            };
            running_relative += relative_frequency;

            rows.push(MeasuresRow {
                years: row.year,
                classes: class.clone(),
                pixel_number: row.pixel_count,
                area_km2: *area,
                cumulative_sum: *cumulative_sum,
                relative_frequency,
                cumulative_relative_frequency: running_relative,
            });
        }
    }

    Ok(MeasuresTable { rows })
}
