//! Table-level comparison of a source dataset against its duplicate.
//!
//! [`DiffEngine::compare`] runs a fixed pipeline over copies of its inputs:
//! emptiness check, exclusion, column intersection, normalization, row
//! ordering, row-count check, and cell equality. Whatever happens inside, the
//! caller gets a [`Comparison`]; internal faults surface as
//! [`Verdict::KoError`] instead of an error value so a table loop never stops
//! halfway through a record.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    align::{common_columns, project, sort_pair},
    data::{Dataset, NULL_MARKER},
    exclusion::ExclusionPolicy,
    normalize::normalize_dataset,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ok,
    OkEmpty,
    Ko,
    KoMissingData,
    KoNoCommonCols,
    KoRowCount,
    KoError,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::OkEmpty => "OK_EMPTY",
            Verdict::Ko => "KO",
            Verdict::KoMissingData => "KO_MISSING_DATA",
            Verdict::KoNoCommonCols => "KO_NO_COMMON_COLS",
            Verdict::KoRowCount => "KO_ROW_COUNT",
            Verdict::KoError => "KO_ERROR",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Verdict::Ok | Verdict::OkEmpty)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a verdict label, possibly produced elsewhere, counts as a failure.
pub fn is_failure_label(label: &str) -> bool {
    label.trim().starts_with("KO")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("row {row} has {found} cell(s) for {expected} column(s)")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),
    #[error("column '{0}' is not present")]
    MissingColumn(String),
}

/// One cell that differs between the two sides, after alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDifference {
    pub row: usize,
    pub column: String,
    /// `None` when the cell is null.
    pub source: Option<String>,
    pub target: Option<String>,
}

impl CellDifference {
    pub fn source_text(&self) -> &str {
        self.source.as_deref().unwrap_or(NULL_MARKER)
    }

    pub fn target_text(&self) -> &str {
        self.target.as_deref().unwrap_or(NULL_MARKER)
    }
}

impl fmt::Display for CellDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} {}: source={} target={}",
            self.row,
            self.column,
            self.source_text(),
            self.target_text()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detail {
    Differences(Vec<CellDifference>),
    Diagnostic(String),
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detail::Diagnostic(message) => f.write_str(message),
            Detail::Differences(cells) => {
                for (idx, cell) in cells.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{cell}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub table: String,
    pub verdict: Verdict,
    pub detail: Option<Detail>,
    /// Non-fatal problems met on the way, such as a side that could not be
    /// sorted.
    pub warnings: Vec<String>,
}

impl Comparison {
    fn new(table: &str, verdict: Verdict, detail: Option<Detail>) -> Self {
        Self {
            table: table.to_string(),
            verdict,
            detail,
            warnings: Vec::new(),
        }
    }

    pub fn differences(&self) -> &[CellDifference] {
        match &self.detail {
            Some(Detail::Differences(cells)) => cells,
            _ => &[],
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match &self.detail {
            Some(Detail::Diagnostic(message)) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    policy: ExclusionPolicy,
}

impl DiffEngine {
    pub fn new(policy: ExclusionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ExclusionPolicy {
        &self.policy
    }

    pub fn compare(&self, source: &Dataset, target: &Dataset, table: &str) -> Comparison {
        match (source.is_empty(), target.is_empty()) {
            (true, true) => return Comparison::new(table, Verdict::OkEmpty, None),
            (true, false) | (false, true) => {
                let side = if source.is_empty() { "source" } else { "target" };
                return Comparison::new(
                    table,
                    Verdict::KoMissingData,
                    Some(Detail::Diagnostic(format!(
                        "{side} dataset is empty for table {table}"
                    ))),
                );
            }
            (false, false) => {}
        }

        let mut warnings = Vec::new();
        let mut comparison = match self.compare_populated(source, target, table, &mut warnings)
        {
            Ok(comparison) => comparison,
            Err(err) => {
                warn!("Comparison of {table} failed: {err}");
                Comparison::new(
                    table,
                    Verdict::KoError,
                    Some(Detail::Diagnostic(err.to_string())),
                )
            }
        };
        comparison.warnings = warnings;
        comparison
    }

    fn compare_populated(
        &self,
        source: &Dataset,
        target: &Dataset,
        table: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Comparison, DiffError> {
        let columns = common_columns(source, target, table, &self.policy);
        if columns.is_empty() {
            return Ok(Comparison::new(
                table,
                Verdict::KoNoCommonCols,
                Some(Detail::Diagnostic(format!(
                    "no common column left in table {table} after exclusions"
                ))),
            ));
        }
        debug!("Comparing {table} on {} column(s)", columns.len());

        let mut left = project(source, &columns)?;
        let mut right = project(target, &columns)?;
        normalize_dataset(&mut left);
        normalize_dataset(&mut right);

        for (side, err) in sort_pair(&mut left, &mut right) {
            let message =
                format!("{side} rows of {table} unsortable, both sides left unsorted: {err}");
            warn!("{message}");
            warnings.push(message);
        }

        if left.row_count() != right.row_count() {
            return Ok(Comparison::new(
                table,
                Verdict::KoRowCount,
                Some(Detail::Diagnostic(format!(
                    "row count differs: source={} target={}",
                    left.row_count(),
                    right.row_count()
                ))),
            ));
        }

        let mut differences = Vec::new();
        for (row_idx, (l, r)) in left.rows().iter().zip(right.rows()).enumerate() {
            for ((column, a), b) in columns.iter().zip(l).zip(r) {
                if a != b {
                    differences.push(CellDifference {
                        row: row_idx,
                        column: column.clone(),
                        source: a.as_display(),
                        target: b.as_display(),
                    });
                }
            }
        }

        if differences.is_empty() {
            Ok(Comparison::new(table, Verdict::Ok, None))
        } else {
            Ok(Comparison::new(
                table,
                Verdict::Ko,
                Some(Detail::Differences(differences)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::from_parts(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn verdict_labels_and_success() {
        assert_eq!(Verdict::KoNoCommonCols.to_string(), "KO_NO_COMMON_COLS");
        assert!(Verdict::OkEmpty.is_success());
        assert!(!Verdict::KoError.is_success());
        assert!(is_failure_label("KO"));
        assert!(is_failure_label("KO_ROW_COUNT"));
        assert!(!is_failure_label("OK_EMPTY"));
    }

    #[test]
    fn empty_sides() {
        let engine = DiffEngine::default();
        let empty = Dataset::new(vec!["a".into()]);
        let full = dataset(&["a"], vec![vec![Value::Integer(1)]]);
        assert_eq!(engine.compare(&empty, &empty, "T").verdict, Verdict::OkEmpty);
        let missing = engine.compare(&full, &empty, "T");
        assert_eq!(missing.verdict, Verdict::KoMissingData);
        assert!(missing.diagnostic().unwrap().contains("T"));
    }

    #[test]
    fn null_is_reported_distinctly_from_empty_text() {
        let engine = DiffEngine::default();
        let source = dataset(&["k", "v"], vec![vec![Value::Integer(1), Value::Null]]);
        let target = dataset(&["k", "v"], vec![vec![Value::Integer(1), Value::from("x")]]);
        let comparison = engine.compare(&source, &target, "T");
        assert_eq!(comparison.verdict, Verdict::Ko);
        let cell = &comparison.differences()[0];
        assert_eq!(cell.source, None);
        assert_eq!(cell.source_text(), NULL_MARKER);
        assert_eq!(cell.target_text(), "x");
    }

    #[test]
    fn ragged_input_becomes_ko_error() {
        let engine = DiffEngine::default();
        let source = dataset(&["a", "b"], vec![vec![Value::Integer(1)]]);
        let target = dataset(&["a", "b"], vec![vec![Value::Integer(1), Value::Integer(2)]]);
        let comparison = engine.compare(&source, &target, "T");
        assert_eq!(comparison.verdict, Verdict::KoError);
        assert!(comparison.diagnostic().unwrap().contains("row 0"));
    }

    #[test]
    fn unsortable_side_is_attached_as_warning() {
        let engine = DiffEngine::default();
        let source = dataset(&["a"], vec![vec![Value::from("x")], vec![Value::Integer(1)]]);
        let comparison = engine.compare(&source, &source.clone(), "T");
        assert_eq!(comparison.verdict, Verdict::Ok);
        assert_eq!(comparison.warnings.len(), 2);
    }
}
