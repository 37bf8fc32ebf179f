//! A [`QueryGateway`] over a directory of CSV exports, one `<table>.csv` per
//! table. Used by the command line and by integration tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    config::LookupSettings,
    data::{Dataset, Value, parse_cell},
    gateway::{GatewayError, KeyParam, Query, QueryGateway},
    io_utils,
};

#[derive(Debug, Clone)]
pub struct CsvGateway {
    root: PathBuf,
    lookup: LookupSettings,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvGateway {
    pub fn new(root: impl Into<PathBuf>, lookup: LookupSettings) -> Self {
        Self {
            root: root.into(),
            lookup,
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.csv"))
    }

    /// Rows of `table` whose `column` equals `value` once both are trimmed.
    fn select(&self, table: &str, column: &str, value: &str) -> Result<Dataset, GatewayError> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(GatewayError::UnknownTable(table.to_string()));
        }
        let display = path.display().to_string();
        let mut reader = io_utils::open_csv_reader_from_path(&path, self.delimiter)
            .map_err(|err| query_error(&display, err))?;
        let headers = io_utils::reader_headers(&mut reader, self.encoding)
            .map_err(|err| query_error(&display, err))?;
        let key_idx = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| GatewayError::Query {
                query: format!("{table} by {column}"),
                message: format!("column '{column}' not found in {display}"),
            })?;

        let wanted = value.trim();
        let mut dataset = Dataset::new(headers);
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record.map_err(|source| GatewayError::Csv {
                path: display.clone(),
                source,
            })?;
            let decoded = io_utils::decode_record(&record, self.encoding)
                .map_err(|err| query_error(&display, err))?;
            if decoded.get(key_idx).map(|cell| cell.trim()) != Some(wanted) {
                continue;
            }
            let row = decoded.iter().map(|cell| parse_cell(cell)).collect();
            dataset.push_row(row).map_err(|err| GatewayError::Query {
                query: format!("{table} row {}", row_idx + 2),
                message: err.to_string(),
            })?;
        }
        debug!(
            "{} row(s) of {table} matched {column}={wanted}",
            dataset.row_count()
        );
        Ok(dataset)
    }

    fn scalar(
        &self,
        column: &str,
        by_column: &str,
        value: &str,
    ) -> Result<Dataset, GatewayError> {
        let rows = self.select(&self.lookup.table, by_column, value)?;
        let mut scalar = Dataset::new(vec![column.to_string()]);
        if let Some(idx) = rows.column_index(column) {
            if let Some(first) = rows.rows().first() {
                scalar
                    .push_row(vec![first[idx].clone()])
                    .map_err(|err| GatewayError::Query {
                        query: column.to_string(),
                        message: err.to_string(),
                    })?;
            }
        } else {
            return Err(GatewayError::Query {
                query: format!("{} by {by_column}", self.lookup.table),
                message: format!("column '{column}' not found"),
            });
        }
        Ok(scalar)
    }
}

fn query_error(path: &str, err: anyhow::Error) -> GatewayError {
    GatewayError::Query {
        query: path.to_string(),
        message: format!("{err:#}"),
    }
}

impl QueryGateway for CsvGateway {
    fn execute(&self, query: &Query) -> Result<Dataset, GatewayError> {
        match query {
            Query::InternalKey { reference } => self.scalar(
                &self.lookup.internal_key_column,
                &self.lookup.external_reference_column,
                reference,
            ),
            Query::ProductCode { key } => self.scalar(
                &self.lookup.product_column,
                &self.lookup.internal_key_column,
                key.as_str(),
            ),
            Query::Table { table, key } => match key {
                KeyParam::Internal(key) => {
                    self.select(table, &self.lookup.internal_key_column, key.as_str())
                }
                KeyParam::External(reference) => {
                    self.select(table, &self.lookup.external_reference_column, reference)
                }
            },
        }
    }
}

/// Reads a whole CSV file into a typed dataset.
pub fn read_dataset(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Dataset> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers of {path:?}"))?;
    let mut dataset = Dataset::new(headers);
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        dataset
            .push_row(decoded.iter().map(|cell| parse_cell(cell)).collect())
            .with_context(|| format!("Row {} in {path:?}", row_idx + 2))?;
    }
    Ok(dataset)
}

/// Writes `dataset` as CSV, nulls as empty cells.
pub fn write_dataset(
    path: &Path,
    dataset: &Dataset,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(Some(path), delimiter, encoding, false)?;
    writer
        .write_record(dataset.columns())
        .with_context(|| format!("Writing header to {path:?}"))?;
    for row in dataset.rows() {
        writer
            .write_record(row.iter().map(|cell| cell.as_display().unwrap_or_default()))
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}
