//! Column intersection, projection, and deterministic row ordering.

use std::{cmp::Ordering, collections::BTreeSet};

use thiserror::Error;

use crate::{
    data::{Dataset, IncomparableValues},
    diff::DiffError,
    exclusion::ExclusionPolicy,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column '{column}': {source}")]
pub struct SortError {
    pub column: String,
    #[source]
    pub source: IncomparableValues,
}

/// Columns present on both sides once exclusions are removed, in lexical
/// order.
pub fn common_columns(
    source: &Dataset,
    target: &Dataset,
    table: &str,
    policy: &ExclusionPolicy,
) -> Vec<String> {
    let kept = |dataset: &Dataset| {
        dataset
            .columns()
            .iter()
            .filter(|column| !policy.is_excluded(table, column))
            .cloned()
            .collect::<BTreeSet<_>>()
    };
    kept(source)
        .intersection(&kept(target))
        .cloned()
        .collect()
}

/// Copies `dataset` restricted to `columns`, in that order.
pub fn project(dataset: &Dataset, columns: &[String]) -> Result<Dataset, DiffError> {
    let width = dataset.columns().len();
    for name in columns {
        if dataset.columns().iter().filter(|column| *column == name).count() > 1 {
            return Err(DiffError::DuplicateColumn(name.clone()));
        }
    }
    let indices = columns
        .iter()
        .map(|name| {
            dataset
                .column_index(name)
                .ok_or_else(|| DiffError::MissingColumn(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(dataset.row_count());
    for (row_idx, row) in dataset.rows().iter().enumerate() {
        if row.len() != width {
            return Err(DiffError::RaggedRow {
                row: row_idx,
                expected: width,
                found: row.len(),
            });
        }
        rows.push(indices.iter().map(|&idx| row[idx].clone()).collect());
    }
    Ok(Dataset::from_parts(columns.to_vec(), rows))
}

/// Sorts rows ascending using every column, left to right, as a composite
/// key. The dataset is left untouched when any column mixes incomparable
/// kinds.
pub fn sort_rows(dataset: &mut Dataset) -> Result<(), SortError> {
    check_sortable(dataset)?;
    order_rows(dataset);
    Ok(())
}

/// Sorts both sides, or neither of them when either side cannot be ordered.
/// Returns the failures, tagged `source` or `target`.
pub fn sort_pair(source: &mut Dataset, target: &mut Dataset) -> Vec<(&'static str, SortError)> {
    let failures: Vec<_> = [("source", &*source), ("target", &*target)]
        .into_iter()
        .filter_map(|(side, dataset)| check_sortable(dataset).err().map(|err| (side, err)))
        .collect();
    if failures.is_empty() {
        order_rows(source);
        order_rows(target);
    }
    failures
}

fn order_rows(dataset: &mut Dataset) {
    dataset.rows_mut().sort_by(|left, right| {
        left.iter()
            .zip(right.iter())
            .map(|(a, b)| a.try_cmp(b).unwrap_or(Ordering::Equal))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn check_sortable(dataset: &Dataset) -> Result<(), SortError> {
    for (col_idx, column) in dataset.columns().iter().enumerate() {
        let mut cells = dataset
            .rows()
            .iter()
            .filter_map(|row| row.get(col_idx))
            .filter(|value| !value.is_null());
        let Some(first) = cells.next() else {
            continue;
        };
        for value in cells {
            first.try_cmp(value).map_err(|source| SortError {
                column: column.clone(),
                source,
            })?;
        }
    }
    Ok(())
}
