use approx::assert_relative_eq;
use chrono::NaiveDate;
use lucc::core::{compute_measures, merge_patch, MeasuresParams};
use lucc::types::{CellValue, ClassifiedStack, GeoTransform, PixelMatrix};
use ndarray::Array3;

fn timeline() -> Vec<NaiveDate> {
    vec![
        NaiveDate::from_ymd_opt(2001, 9, 1).unwrap(),
        NaiveDate::from_ymd_opt(2002, 9, 1).unwrap(),
    ]
}

fn labels() -> Vec<String> {
    vec!["Forest".to_string(), "Pasture".to_string()]
}

/// 2x2 all-Forest stack with cell centres on x, y in {0, 1}
fn forest_stack() -> ClassifiedStack {
    let data = Array3::from_elem((2, 2, 2), Some(1));
    let gt = GeoTransform::from_gdal([-0.5, 1.0, 0.0, 1.5, 0.0, -1.0]);
    ClassifiedStack::new(data, gt, String::new(), timeline()).unwrap()
}

#[test]
fn test_single_pasture_edit_scenario() {
    let _ = env_logger::builder().is_test(true).try_init();

    let stack = forest_stack();
    let mut edits = PixelMatrix::new(["2002-09-01"]);
    edits.push_row(0.0, 0.0, vec![Some(CellValue::from("Pasture"))]).unwrap();

    let merged = merge_patch(&stack, &edits, &timeline(), &labels()).unwrap();
    assert_eq!(merged.years, vec![2001, 2002]);
    assert_eq!(merged.rows.len(), 4);

    for row in &merged.rows {
        let expected_2002 = if row.x == 0.0 && row.y == 0.0 { 2 } else { 1 };
        assert_eq!(row.values, vec![Some(1), Some(expected_2002)], "pixel ({}, {})", row.x, row.y);
    }

    let table = compute_measures(
        Some(&merged.to_pixel_matrix()),
        None,
        &MeasuresParams { pixel_resolution: Some(100.0) },
    )
    .unwrap();

    let forest: Vec<_> = table.class_rows(&CellValue::Code(1)).collect();
    assert_eq!(forest.len(), 2);
    assert_eq!((forest[0].years, forest[0].pixel_number), (2001, 4));
    assert_eq!((forest[1].years, forest[1].pixel_number), (2002, 3));
    assert_relative_eq!(forest[0].area_km2, 0.04, epsilon = 1e-12);
    assert_relative_eq!(forest[1].area_km2, 0.03, epsilon = 1e-12);
    assert_relative_eq!(forest[1].cumulative_relative_frequency, 100.0, epsilon = 1e-6);

    let pasture: Vec<_> = table.class_rows(&CellValue::Code(2)).collect();
    assert_eq!(pasture.len(), 1);
    assert_eq!(pasture[0].years, 2002);
    assert_relative_eq!(pasture[0].area_km2, 0.01, epsilon = 1e-12);
    assert_relative_eq!(pasture[0].cumulative_relative_frequency, 100.0, epsilon = 1e-6);
}

#[test]
fn test_merge_keeps_originals_and_applies_edits() {
    let _ = env_logger::builder().is_test(true).try_init();

    // distinct original codes per cell and year
    let mut data = Array3::from_elem((2, 2, 2), None);
    for layer in 0..2 {
        for row in 0..2 {
            for col in 0..2 {
                data[[layer, row, col]] = Some((layer * 4 + row * 2 + col + 1) as i32);
            }
        }
    }
    data[[1, 1, 1]] = None;
    let gt = GeoTransform::from_gdal([-0.5, 1.0, 0.0, 1.5, 0.0, -1.0]);
    let stack = ClassifiedStack::new(data.clone(), gt, String::new(), timeline()).unwrap();

    let mut edits = PixelMatrix::new(["X2001.09.01", "X2002.09.01"]);
    edits
        .push_row(1.0, 1.0, vec![Some(CellValue::from("Pasture")), None])
        .unwrap();
    edits
        .push_row(1.0, 0.0, vec![None, Some(CellValue::from("Forest"))])
        .unwrap();

    let merged = merge_patch(&stack, &edits, &timeline(), &labels()).unwrap();

    for (layer, year) in [2001, 2002].into_iter().enumerate() {
        for row in 0..2 {
            for col in 0..2 {
                let (x, y) = stack.cell_center(row, col);
                let expected = match (x as i32, y as i32, year) {
                    (1, 1, 2001) => Some(2),
                    (1, 0, 2002) => Some(1),
                    _ => data[[layer, row, col]],
                };
                assert_eq!(merged.value_at(x, y, year), expected, "({}, {}) in {}", x, y, year);
            }
        }
    }
}

#[test]
fn test_timeline_completeness_with_sparse_edits() {
    let stack = forest_stack();
    let mut full_timeline = timeline();
    full_timeline.push(NaiveDate::from_ymd_opt(2004, 9, 1).unwrap());
    full_timeline.push(NaiveDate::from_ymd_opt(2003, 9, 1).unwrap());

    let mut edits = PixelMatrix::new(["2004-09-01"]);
    edits.push_row(1.0, 1.0, vec![Some(CellValue::from("Pasture"))]).unwrap();

    let merged = merge_patch(&stack, &edits, &full_timeline, &labels()).unwrap();
    assert_eq!(merged.years, vec![2001, 2002, 2003, 2004]);
    assert!(merged.rows.iter().all(|row| row.values.len() == 4));
    assert!(merged.rows.iter().all(|row| row.values[2].is_none()));
    assert_eq!(merged.value_at(1.0, 1.0, 2004), Some(2));
    assert_eq!(merged.value_at(0.0, 1.0, 2004), None);
}
