//! The query seam between the engine and whatever store holds the records.
//!
//! Queries are values, not text: each table declares which key it is looked
//! up by, and binding a table to a record's keys yields the exact query to
//! run.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Dataset, Value};

/// Storage-assigned identifier used for joins inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InternalKey(String);

impl InternalKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds a key from a looked-up cell. Null and blank cells are no key.
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .as_display()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    #[default]
    ByInternalKey,
    ByExternalReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyParam {
    Internal(InternalKey),
    External(String),
}

impl fmt::Display for KeyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyParam::Internal(key) => write!(f, "internal key {key}"),
            KeyParam::External(reference) => write!(f, "reference {reference}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Zero or one row holding the internal key of `reference`.
    InternalKey { reference: String },
    /// Zero or one row holding the product code of the record.
    ProductCode { key: InternalKey },
    /// Every row of `table` belonging to one record.
    Table { table: String, key: KeyParam },
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::InternalKey { reference } => write!(f, "internal key of {reference}"),
            Query::ProductCode { key } => write!(f, "product code of {key}"),
            Query::Table { table, key } => write!(f, "{table} rows for {key}"),
        }
    }
}

/// Both identifiers of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub reference: String,
    pub key: InternalKey,
}

impl RecordKeys {
    pub fn new(reference: impl Into<String>, key: InternalKey) -> Self {
        Self {
            reference: reference.into(),
            key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub key: KeyKind,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, key: KeyKind) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    pub fn by_internal_key(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::ByInternalKey)
    }

    pub fn bind(&self, keys: &RecordKeys) -> Query {
        let key = match self.key {
            KeyKind::ByInternalKey => KeyParam::Internal(keys.key.clone()),
            KeyKind::ByExternalReference => KeyParam::External(keys.reference.clone()),
        };
        Query::Table {
            table: self.name.clone(),
            key,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("query '{query}' failed: {message}")]
    Query { query: String, message: String },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Runs queries against the record store.
///
/// A query that matches nothing must return an empty dataset; errors are
/// reserved for transport, IO, or malformed-query failures.
pub trait QueryGateway {
    fn execute(&self, query: &Query) -> Result<Dataset, GatewayError>;
}

impl<G: QueryGateway + ?Sized> QueryGateway for &G {
    fn execute(&self, query: &Query) -> Result<Dataset, GatewayError> {
        (**self).execute(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_uses_declared_key_kind() {
        let keys = RecordKeys::new("182-1", InternalKey::new("77"));
        let by_key = TableDefinition::by_internal_key("LV.SCNTT0").bind(&keys);
        assert_eq!(
            by_key,
            Query::Table {
                table: "LV.SCNTT0".into(),
                key: KeyParam::Internal(InternalKey::new("77")),
            }
        );
        let by_ref = TableDefinition::new("EXT", KeyKind::ByExternalReference).bind(&keys);
        assert_eq!(
            by_ref,
            Query::Table {
                table: "EXT".into(),
                key: KeyParam::External("182-1".into()),
            }
        );
    }

    #[test]
    fn internal_key_from_value_skips_blank() {
        assert_eq!(
            InternalKey::from_value(&Value::Integer(12)),
            Some(InternalKey::new("12"))
        );
        assert_eq!(InternalKey::from_value(&Value::Null), None);
        assert_eq!(InternalKey::from_value(&Value::from("  ")), None);
    }

    #[test]
    fn key_kind_reads_snake_case() {
        let table: TableDefinition =
            serde_yaml::from_str("name: T\nkey: by_external_reference\n").unwrap();
        assert_eq!(table.key, KeyKind::ByExternalReference);
        let defaulted: TableDefinition = serde_yaml::from_str("name: T\n").unwrap();
        assert_eq!(defaulted.key, KeyKind::ByInternalKey);
    }
}
