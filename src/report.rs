//! CSV files exchanged with the operators: source lists, the activation
//! mapping, the detailed reconciliation report, and the product summary.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use log::info;
use serde::Serialize;

use crate::{
    activation::ActivationEntry,
    io_utils,
    reconcile::{MappingEntry, RecordMapping},
    summary::ProductSummary,
};

pub const SOURCE_COLUMN: &str = "source_reference";
pub const TARGET_COLUMN: &str = "target_reference";
pub const STATUS_COLUMN: &str = "status";

/// Reads the references to activate: the `source_reference` column when
/// present, otherwise the first column. Blank cells are skipped.
pub fn read_sources(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Vec<String>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let idx = header_index(&headers, SOURCE_COLUMN).unwrap_or(0);
    let mut sources = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        if let Some(reference) = decoded.get(idx).map(|cell| cell.trim())
            && !reference.is_empty()
        {
            sources.push(reference.to_string());
        }
    }
    Ok(sources)
}

pub fn read_mapping(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<MappingEntry>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    let required = |name: &str| {
        header_index(&headers, name).ok_or_else(|| {
            anyhow!("Mapping {path:?} must contain the columns '{SOURCE_COLUMN}' and '{TARGET_COLUMN}'")
        })
    };
    let source_idx = required(SOURCE_COLUMN)?;
    let target_idx = required(TARGET_COLUMN)?;
    let status_idx = header_index(&headers, STATUS_COLUMN);

    let mut entries = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        let cell = |idx: usize| decoded.get(idx).cloned().unwrap_or_default();
        entries.push(MappingEntry {
            source_reference: cell(source_idx),
            target_reference: cell(target_idx),
            activation_status: status_idx.map(cell),
        });
    }
    Ok(entries)
}

fn header_index(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

#[derive(Debug, Serialize)]
struct ActivationRow<'a> {
    source_reference: &'a str,
    target_reference: &'a str,
    target_key: &'a str,
    status: &'static str,
    snapshots: usize,
    activated_at: String,
    faults: String,
}

pub fn write_activation(
    path: &Path,
    entries: &[ActivationEntry],
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(Some(path), delimiter, encoding, true)?;
    for entry in entries {
        writer
            .serialize(ActivationRow {
                source_reference: &entry.source_reference,
                target_reference: entry.target_reference.as_deref().unwrap_or_default(),
                target_key: entry.target_key.as_ref().map(|k| k.as_str()).unwrap_or_default(),
                status: entry.status.as_str(),
                snapshots: entry.snapshots,
                activated_at: entry.activated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                faults: entry.faults.join(" | "),
            })
            .with_context(|| format!("Writing activation row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    info!("Activation mapping for {} record(s) written to {path:?}", entries.len());
    Ok(())
}

/// One line of the detailed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailRow {
    pub source_reference: String,
    pub target_reference: String,
    pub product: String,
    pub table: String,
    pub status: String,
    pub source_type: String,
    pub details: String,
}

/// One row per compared table, plus one per record that never reached its
/// table loop so that no record is missing from the report.
pub fn detail_rows(records: &[RecordMapping]) -> Vec<DetailRow> {
    let mut rows = Vec::new();
    for record in records {
        let base = |table: &str, status: String, source_type: &str, details: String| DetailRow {
            source_reference: record.source_reference.clone(),
            target_reference: record.target_reference.clone(),
            product: record.product.clone(),
            table: table.to_string(),
            status,
            source_type: source_type.to_string(),
            details,
        };
        if record.tables.is_empty() {
            rows.push(base(
                "",
                record.status().to_string(),
                "",
                record.faults.join(" | "),
            ));
            continue;
        }
        for outcome in &record.tables {
            let comparison = &outcome.comparison;
            let details = comparison
                .detail
                .iter()
                .map(|detail| detail.to_string())
                .chain(comparison.warnings.iter().cloned())
                .chain(outcome.faults.iter().cloned())
                .collect::<Vec<_>>()
                .join(" | ");
            rows.push(base(
                &comparison.table,
                comparison.verdict.to_string(),
                outcome.origin.as_str(),
                details,
            ));
        }
    }
    rows
}

pub fn write_detail_report(
    path: &Path,
    records: &[RecordMapping],
    encoding: &'static Encoding,
) -> Result<()> {
    let rows = detail_rows(records);
    let mut writer =
        io_utils::open_csv_writer(Some(path), io_utils::REPORT_DELIMITER, encoding, true)?;
    for row in &rows {
        writer
            .serialize(row)
            .with_context(|| format!("Writing report row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    info!("Detailed report ({} row(s)) written to {path:?}", rows.len());
    Ok(())
}

pub fn write_summary(
    path: &Path,
    summary: &ProductSummary,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer =
        io_utils::open_csv_writer(Some(path), io_utils::REPORT_DELIMITER, encoding, true)?;
    writer
        .write_record(summary.headers())
        .with_context(|| format!("Writing header to {path:?}"))?;
    for row in summary.table_rows() {
        writer
            .write_record(&row)
            .with_context(|| format!("Writing summary row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    info!("Product summary written to {path:?}");
    Ok(())
}
