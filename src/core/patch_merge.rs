use crate::types::{
    coordinate_from_key, coordinate_key, year_from_header, CellValue, ClassCode, ClassifiedStack,
    LuccError, LuccResult, MergedRasterTable, MergedRow, PixelMatrix,
};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Normalized (x, y) join key
type CellKey = (i64, i64);

/// Resolve an edit cell to a class code.
///
/// Labels map to their 1-based position in `class_labels` (first match).
/// Numeric codes pass through unchanged.
pub fn resolve_label(value: &CellValue, class_labels: &[String], column: &str) -> LuccResult<ClassCode> {
    match value {
        CellValue::Code(code) => Ok(*code),
        CellValue::Label(label) => class_labels
            .iter()
            .position(|l| l == label)
            .map(|i| (i + 1) as ClassCode)
            .ok_or_else(|| LuccError::UnresolvedLabel {
                label: label.clone(),
                column: column.to_string(),
            }),
    }
}

/// Merge sparse pixel edits into an original stack.
///
/// Coordinates from both sides are rounded to five decimals before joining.
/// Edited cells take the resolved edit value, every other cell keeps its
/// original value. The result has exactly one column per timeline year in
/// ascending order; years without any data are filled with missing values.
pub fn merge_patch(
    original: &ClassifiedStack,
    edits: &PixelMatrix,
    timeline: &[NaiveDate],
    class_labels: &[String],
) -> LuccResult<MergedRasterTable> {
    if timeline.is_empty() {
        return Err(LuccError::Validation("Timeline is empty".to_string()));
    }

    let timeline_years: BTreeSet<i32> = timeline.iter().map(|d| d.year()).collect();
    if timeline_years.len() != timeline.len() {
        return Err(LuccError::Validation(
            "Timeline dates must fall in distinct years".to_string(),
        ));
    }

    log::info!(
        "Merging {} edit rows into a {}x{}x{} stack",
        edits.rows.len(),
        original.layer_count(),
        original.grid_size().0,
        original.grid_size().1
    );

    // Original values under normalized coordinates, in grid order
    let mut cells: Vec<CellKey> = Vec::new();
    let mut merged: HashMap<CellKey, BTreeMap<i32, Option<ClassCode>>> = HashMap::new();

    let stack_years = original.years();
    for (layer, year) in stack_years.iter().enumerate() {
        if !timeline_years.contains(year) {
            log::warn!("Original layer {} (year {}) is not part of the timeline, ignoring it", layer, year);
        }
    }

    let (height, width) = original.grid_size();
    for row in 0..height {
        for col in 0..width {
            let (x, y) = original.cell_center(row, col);
            let key = (coordinate_key(x), coordinate_key(y));
            let entry = merged.entry(key).or_insert_with(|| {
                cells.push(key);
                BTreeMap::new()
            });
            for (layer, year) in stack_years.iter().enumerate() {
                if timeline_years.contains(year) {
                    entry.insert(*year, original.data[[layer, row, col]]);
                }
            }
        }
    }

    // Edits in long form, labels resolved, overriding originals
    let edit_years = edits
        .columns
        .iter()
        .map(|header| year_from_header(header))
        .collect::<LuccResult<Vec<i32>>>()?;
    for (header, year) in edits.columns.iter().zip(&edit_years) {
        if !timeline_years.contains(year) {
            return Err(LuccError::Validation(format!(
                "Edit column '{}' (year {}) is outside the timeline",
                header, year
            )));
        }
    }

    for edit in &edits.rows {
        edits.check_row(edit)?;
    }

    let mut outside_grid = 0usize;
    let mut applied = 0usize;
    for edit in &edits.rows {
        let key = (coordinate_key(edit.x), coordinate_key(edit.y));
        let entry = merged.entry(key).or_insert_with(|| {
            outside_grid += 1;
            cells.push(key);
            BTreeMap::new()
        });
        for ((value, year), header) in edit.values.iter().zip(&edit_years).zip(&edits.columns) {
            let Some(value) = value else { continue };
            let code = resolve_label(value, class_labels, header)?;
            entry.insert(*year, Some(code));
            applied += 1;
        }
    }

    if outside_grid > 0 {
        log::warn!("{} edit rows do not match any cell of the original grid", outside_grid);
    }
    log::debug!("Applied {} edit values", applied);

    // Pivot back to wide form over the full timeline
    let present: BTreeSet<i32> = merged.values().flat_map(|years| years.keys().copied()).collect();
    for year in timeline_years.difference(&present) {
        log::debug!("Year {} has no data, filling with missing values", year);
    }
    let years: Vec<i32> = timeline_years.into_iter().collect();

    cells.sort_unstable();
    let rows = cells
        .into_iter()
        .map(|key| {
            let by_year = &merged[&key];
            MergedRow {
                x: coordinate_from_key(key.0),
                y: coordinate_from_key(key.1),
                values: years.iter().map(|year| by_year.get(year).copied().flatten()).collect(),
            }
        })
        .collect();

    Ok(MergedRasterTable { years, rows })
}
