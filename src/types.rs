use chrono::{Datelike, NaiveDate};
use ndarray::Array3;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Integer class code stored in a classified raster cell
pub type ClassCode = i32;

/// Decimal places used to normalize x/y coordinates before they are used as join keys
pub const COORDINATE_PRECISION: i32 = 5;

/// Value carried by a pixel table cell: a numeric class code or a class label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Code(ClassCode),
    Label(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Code(code) => write!(f, "{}", code),
            CellValue::Label(label) => write!(f, "{}", label),
        }
    }
}

impl From<ClassCode> for CellValue {
    fn from(code: ClassCode) -> Self {
        CellValue::Code(code)
    }
}

impl From<&str> for CellValue {
    fn from(label: &str) -> Self {
        CellValue::Label(label.to_string())
    }
}

impl From<String> for CellValue {
    fn from(label: String) -> Self {
        CellValue::Label(label)
    }
}

/// One pixel of a wide table: coordinates plus one value per layer column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelRow {
    pub x: f64,
    pub y: f64,
    pub values: Vec<Option<CellValue>>,
}

/// Wide pixel table (x, y, one column per time layer).
///
/// This is the shape produced by predicate evaluators and by dumping a
/// [`ClassifiedStack`], and the shape consumed by the GeoTIFF writer.
/// Column headers are dates or year labels such as `"2001-09-01"`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<PixelRow>,
}

impl PixelMatrix {
    /// Create an empty table with the given layer columns
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a pixel row, checking it has one value per layer column
    pub fn push_row(&mut self, x: f64, y: f64, values: Vec<Option<CellValue>>) -> LuccResult<()> {
        let row = PixelRow { x, y, values };
        self.check_row(&row)?;
        self.rows.push(row);
        Ok(())
    }

    /// Reject a row whose width differs from the number of layer columns
    pub fn check_row(&self, row: &PixelRow) -> LuccResult<()> {
        if row.values.len() != self.columns.len() {
            return Err(LuccError::Processing(format!(
                "Row at ({}, {}) has {} values but the table has {} layer columns",
                row.x,
                row.y,
                row.values.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One (year, class, pixel count) triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRow {
    #[serde(rename = "Years")]
    pub year: i32,
    #[serde(rename = "Classes")]
    pub class: CellValue,
    #[serde(rename = "Pixel_number")]
    pub pixel_count: u64,
}

/// Long-format frequency table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrequencyTable {
    pub rows: Vec<FrequencyRow>,
}

impl FrequencyTable {
    /// Total pixel count over all classes for one year
    pub fn total_for_year(&self, year: i32) -> u64 {
        self.rows
            .iter()
            .filter(|row| row.year == year)
            .map(|row| row.pixel_count)
            .sum()
    }
}

/// Frequency row extended with area and relative frequency measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuresRow {
    #[serde(rename = "Years")]
    pub years: i32,
    #[serde(rename = "Classes")]
    pub classes: CellValue,
    #[serde(rename = "Pixel_number")]
    pub pixel_number: u64,
    #[serde(rename = "Area_km2")]
    pub area_km2: f64,
    #[serde(rename = "Cumulative_Sum")]
    pub cumulative_sum: f64,
    #[serde(rename = "Relative_Frequency")]
    pub relative_frequency: f64,
    #[serde(rename = "Cumulative_Relative_Frequency")]
    pub cumulative_relative_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasuresTable {
    pub rows: Vec<MeasuresRow>,
}

impl MeasuresTable {
    /// Rows of one class, in year order
    pub fn class_rows<'a, 'b>(&'a self, class: &'b CellValue) -> impl Iterator<Item = &'a MeasuresRow> + 'b
    where
        'a: 'b,
    {
        self.rows.iter().filter(move |row| &row.classes == class)
    }
}

/// Full-grid row of a merged raster table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    pub x: f64,
    pub y: f64,
    pub values: Vec<Option<ClassCode>>,
}

/// Wide table produced by merging pixel edits into an original stack.
/// `years` is ascending and `values[i]` of every row belongs to `years[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedRasterTable {
    pub years: Vec<i32>,
    pub rows: Vec<MergedRow>,
}

impl MergedRasterTable {
    /// Value at a coordinate for a year, after coordinate normalization
    pub fn value_at(&self, x: f64, y: f64, year: i32) -> Option<ClassCode> {
        let column = self.years.iter().position(|&column_year| column_year == year)?;
        let key = (coordinate_key(x), coordinate_key(y));
        self.rows
            .iter()
            .find(|row| (coordinate_key(row.x), coordinate_key(row.y)) == key)
            .and_then(|row| row.values[column])
    }

    /// Convert to a wide pixel table with year headers
    pub fn to_pixel_matrix(&self) -> PixelMatrix {
        PixelMatrix {
            columns: self.years.iter().map(|year| year.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| PixelRow {
                    x: row.x,
                    y: row.y,
                    values: row.values.iter().map(|v| v.map(CellValue::Code)).collect(),
                })
                .collect(),
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Geographic coordinates of a cell centre
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Cell containing a coordinate, for north-up grids. `None` when the
    /// coordinate falls outside a `height` x `width` grid.
    pub fn cell_index(&self, x: f64, y: f64, height: usize, width: usize) -> Option<(usize, usize)> {
        let col = ((x - self.top_left_x) / self.pixel_width).floor();
        let row = ((y - self.top_left_y) / self.pixel_height).floor();
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// Multi-layer categorical raster, one layer per timeline date
#[derive(Debug, Clone)]
pub struct ClassifiedStack {
    /// Cell values indexed as (layer, row, col); `None` is no data
    pub data: Array3<Option<ClassCode>>,
    pub geo_transform: GeoTransform,
    /// Coordinate reference system as WKT
    pub projection: String,
    pub timeline: Vec<NaiveDate>,
    pub layer_names: Vec<String>,
}

impl ClassifiedStack {
    /// Build a stack, checking that there is one timeline date per layer
    pub fn new(
        data: Array3<Option<ClassCode>>,
        geo_transform: GeoTransform,
        projection: String,
        timeline: Vec<NaiveDate>,
    ) -> LuccResult<Self> {
        let (layers, _, _) = data.dim();
        if layers != timeline.len() {
            return Err(LuccError::Validation(format!(
                "Raster stack has {} layers but the timeline has {} dates",
                layers,
                timeline.len()
            )));
        }
        let layer_names = timeline.iter().map(|d| d.format("%Y.%m.%d").to_string()).collect();
        Ok(Self {
            data,
            geo_transform,
            projection,
            timeline,
            layer_names,
        })
    }

    pub fn layer_count(&self) -> usize {
        self.data.dim().0
    }

    /// (height, width) of every layer
    pub fn grid_size(&self) -> (usize, usize) {
        let (_, height, width) = self.data.dim();
        (height, width)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.geo_transform.cell_center(row, col)
    }

    /// Years of the timeline, one per layer
    pub fn years(&self) -> Vec<i32> {
        self.timeline.iter().map(|d| d.year()).collect()
    }

    /// Dump the stack as a wide pixel table at cell centres, one column per
    /// layer name.
    ///
    /// With `class_labels`, code `k` becomes the k-th label (1-based). A code
    /// with no corresponding label is rejected.
    pub fn to_pixel_matrix(&self, class_labels: Option<&[String]>) -> LuccResult<PixelMatrix> {
        let (height, width) = self.grid_size();
        let mut matrix = PixelMatrix::new(self.layer_names.iter().cloned());
        matrix.rows.reserve(height * width);

        for row in 0..height {
            for col in 0..width {
                let (x, y) = self.cell_center(row, col);
                let mut values = Vec::with_capacity(self.layer_count());
                for layer in 0..self.layer_count() {
                    let value = match (self.data[[layer, row, col]], class_labels) {
                        (None, _) => None,
                        (Some(code), None) => Some(CellValue::Code(code)),
                        (Some(code), Some(labels)) => {
                            let label = usize::try_from(code)
                                .ok()
                                .and_then(|k| k.checked_sub(1))
                                .and_then(|i| labels.get(i))
                                .ok_or_else(|| {
                                    LuccError::Validation(format!(
                                        "Class code {} has no label among {} labels",
                                        code,
                                        labels.len()
                                    ))
                                })?;
                            Some(CellValue::Label(label.clone()))
                        }
                    };
                    values.push(value);
                }
                matrix.rows.push(PixelRow { x, y, values });
            }
        }

        Ok(matrix)
    }
}

/// Round a coordinate to [`COORDINATE_PRECISION`] decimals and return it as an integer key
pub fn coordinate_key(value: f64) -> i64 {
    (value * 10f64.powi(COORDINATE_PRECISION)).round() as i64
}

/// Inverse of [`coordinate_key`]
pub fn coordinate_from_key(key: i64) -> f64 {
    key as f64 / 10f64.powi(COORDINATE_PRECISION)
}

fn year_pattern() -> LuccResult<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d{4}").ok())
        .as_ref()
        .ok_or_else(|| LuccError::Processing("Failed to compile the year pattern".to_string()))
}

/// Extract the year from a layer header such as "2001-09-01", "X2001.09.01" or "2001"
pub fn year_from_header(header: &str) -> LuccResult<i32> {
    year_pattern()?
        .find(header)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| LuccError::Validation(format!("Cannot extract a year from column '{}'", header)))
}

/// Error types for land-use change processing
#[derive(Debug, thiserror::Error)]
pub enum LuccError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Class label '{label}' in column '{column}' does not match any legend entry")]
    UnresolvedLabel { label: String, column: String },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for land-use change operations
pub type LuccResult<T> = Result<T, LuccError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_year_from_header() {
        assert_eq!(year_from_header("2001-09-01").unwrap(), 2001);
        assert_eq!(year_from_header("X2002.09.01").unwrap(), 2002);
        assert_eq!(year_from_header("2003").unwrap(), 2003);
        assert!(matches!(year_from_header("layer"), Err(LuccError::Validation(_))));
    }

    #[test]
    fn test_check_row_rejects_wrong_width() {
        let matrix = PixelMatrix::new(["2001", "2002"]);
        let short = PixelRow { x: 0.0, y: 0.0, values: vec![Some("Forest".into())] };
        assert!(matches!(matrix.check_row(&short), Err(LuccError::Processing(_))));

        let mut matrix = matrix;
        assert!(matrix.push_row(0.0, 0.0, vec![None, None, None]).is_err());
        assert!(matrix.rows.is_empty());
    }

    #[test]
    fn test_serialized_column_names() {
        let measures = MeasuresRow {
            years: 2002,
            classes: CellValue::from("Pasture"),
            pixel_number: 1,
            area_km2: 0.01,
            cumulative_sum: 0.01,
            relative_frequency: 100.0,
            cumulative_relative_frequency: 100.0,
        };
        let json = serde_json::to_value(&measures).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        for key in [
            "Years",
            "Classes",
            "Pixel_number",
            "Area_km2",
            "Cumulative_Sum",
            "Relative_Frequency",
            "Cumulative_Relative_Frequency",
        ] {
            assert!(keys.contains(&key), "missing column {}", key);
        }
        assert_eq!(keys.len(), 7);
        assert_eq!(json["Classes"], serde_json::json!("Pasture"));

        let frequency = FrequencyRow { year: 2001, class: CellValue::Code(1), pixel_count: 4 };
        let json = serde_json::to_value(&frequency).unwrap();
        assert_eq!(json, serde_json::json!({ "Years": 2001, "Classes": 1, "Pixel_number": 4 }));
    }

    #[test]
    fn test_coordinate_key_normalizes_precision() {
        assert_eq!(coordinate_key(-55.123456789), coordinate_key(-55.12346));
        assert_ne!(coordinate_key(1.00001), coordinate_key(1.00002));
        assert_eq!(coordinate_from_key(coordinate_key(12.5)), 12.5);
    }

    #[test]
    fn test_cell_center_and_index() {
        let gt = GeoTransform::from_gdal([100.0, 10.0, 0.0, 200.0, 0.0, -10.0]);
        assert_eq!(gt.cell_center(0, 0), (105.0, 195.0));
        assert_eq!(gt.cell_center(2, 1), (115.0, 175.0));
        assert_eq!(gt.cell_index(115.0, 175.0, 3, 3), Some((2, 1)));
        assert_eq!(gt.cell_index(135.0, 175.0, 3, 3), None);
    }

    #[test]
    fn test_stack_rejects_timeline_mismatch() {
        let data = Array3::from_elem((2, 1, 1), Some(1));
        let gt = GeoTransform::from_gdal([0.0, 1.0, 0.0, 1.0, 0.0, -1.0]);
        let timeline = vec![NaiveDate::from_ymd_opt(2001, 9, 1).unwrap()];
        let result = ClassifiedStack::new(data, gt, String::new(), timeline);
        assert!(matches!(result, Err(LuccError::Validation(_))));
    }

    #[test]
    fn test_stack_to_labelled_matrix() {
        let mut data = Array3::from_elem((1, 1, 2), Some(1));
        data[[0, 0, 1]] = Some(3);
        let gt = GeoTransform::from_gdal([0.0, 1.0, 0.0, 1.0, 0.0, -1.0]);
        let timeline = vec![NaiveDate::from_ymd_opt(2001, 9, 1).unwrap()];
        let stack = ClassifiedStack::new(data, gt, String::new(), timeline).unwrap();

        let codes = stack.to_pixel_matrix(None).unwrap();
        assert_eq!(codes.columns, vec!["2001.09.01".to_string()]);
        assert_eq!(codes.rows[1].values[0], Some(CellValue::Code(3)));

        let labels = vec!["Forest".to_string(), "Pasture".to_string()];
        let result = stack.to_pixel_matrix(Some(&labels));
        assert!(matches!(result, Err(LuccError::Validation(_))));
    }
}
