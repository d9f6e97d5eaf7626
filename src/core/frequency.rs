use crate::types::{
    year_from_header, CellValue, FrequencyRow, FrequencyTable, LuccError, LuccResult, PixelMatrix,
};
use std::collections::{BTreeMap, HashSet};

/// Frequency extraction parameters
#[derive(Debug, Clone)]
pub struct ExtractParams {
    /// Number of matrices processed concurrently (1 = sequential)
    pub parallelism: usize,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

/// Counts keyed by (year, class)
type ClassCounts = BTreeMap<(i32, CellValue), u64>;

/// Tabulate one wide matrix into (year, class) pixel counts.
///
/// Cells are reshaped to (x, y, column, value), missing values dropped and
/// exact duplicates removed before counting.
pub fn tabulate_matrix(matrix: &PixelMatrix) -> LuccResult<ClassCounts> {
    let years = matrix
        .columns
        .iter()
        .map(|header| year_from_header(header))
        .collect::<LuccResult<Vec<i32>>>()?;

    let mut seen: HashSet<(u64, u64, usize, &CellValue)> = HashSet::new();
    let mut counts = ClassCounts::new();

    for row in &matrix.rows {
        matrix.check_row(row)?;
        for (column, value) in row.values.iter().enumerate() {
            let Some(value) = value else { continue };
            if !seen.insert((row.x.to_bits(), row.y.to_bits(), column, value)) {
                continue;
            }
            *counts.entry((years[column], value.clone())).or_insert(0) += 1;
        }
    }

    Ok(counts)
}

/// Turn (year, class) counts into a table sorted by class, then year
fn counts_to_table(counts: ClassCounts) -> FrequencyTable {
    let mut rows: Vec<FrequencyRow> = counts
        .into_iter()
        .map(|((year, class), pixel_count)| FrequencyRow {
            year,
            class,
            pixel_count,
        })
        .collect();
    rows.sort_by(|a, b| a.class.cmp(&b.class).then(a.year.cmp(&b.year)));
    FrequencyTable { rows }
}

/// Derive a long frequency table from a single matrix
pub fn frequency_from_matrix(matrix: &PixelMatrix) -> LuccResult<FrequencyTable> {
    Ok(counts_to_table(tabulate_matrix(matrix)?))
}

/// Extract a combined frequency table from several matrices, e.g. one per spatial tile.
///
/// `None` entries are skipped. Counts of identical (year, class) pairs coming
/// from different matrices are summed.
pub fn extract_frequency(
    matrices: &[Option<PixelMatrix>],
    params: &ExtractParams,
) -> LuccResult<FrequencyTable> {
    if params.parallelism == 0 {
        return Err(LuccError::Validation(
            "Parallelism must be a positive integer".to_string(),
        ));
    }

    let inputs: Vec<&PixelMatrix> = matrices.iter().flatten().collect();
    if inputs.is_empty() {
        return Err(LuccError::Validation(
            "No matrices supplied: the list is empty after dropping missing entries".to_string(),
        ));
    }

    log::info!(
        "Extracting frequencies from {} matrices ({} dropped) with parallelism {}",
        inputs.len(),
        matrices.len() - inputs.len(),
        params.parallelism
    );

    let partials = tabulate_all(&inputs, params.parallelism)?;

    let mut merged = ClassCounts::new();
    for partial in partials {
        for (key, count) in partial {
            *merged.entry(key).or_insert(0) += count;
        }
    }

    let table = counts_to_table(merged);
    log::info!("Frequency table has {} rows", table.rows.len());
    Ok(table)
}

#[cfg(feature = "parallel")]
fn tabulate_all(inputs: &[&PixelMatrix], parallelism: usize) -> LuccResult<Vec<ClassCounts>> {
    use rayon::prelude::*;

    if parallelism == 1 || inputs.len() == 1 {
        return tabulate_sequential(inputs);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .build()
        .map_err(|e| LuccError::Processing(format!("Failed to build worker pool: {}", e)))?;

    pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .map(|(i, matrix)| {
                log::debug!("Tabulating matrix {} ({} rows)", i, matrix.rows.len());
                tabulate_matrix(matrix)
            })
            .collect()
    })
}

#[cfg(not(feature = "parallel"))]
fn tabulate_all(inputs: &[&PixelMatrix], _parallelism: usize) -> LuccResult<Vec<ClassCounts>> {
    tabulate_sequential(inputs)
}

fn tabulate_sequential(inputs: &[&PixelMatrix]) -> LuccResult<Vec<ClassCounts>> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, matrix)| {
            log::debug!("Tabulating matrix {} ({} rows)", i, matrix.rows.len());
            tabulate_matrix(matrix)
        })
        .collect()
}
