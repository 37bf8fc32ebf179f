//! Run configuration loaded from YAML.
//!
//! Every section is optional. Missing sections fall back to the standard
//! contract setup: the eight contract tables, the `LV.SCNTT0` lookup, the
//! standard exclusion rules, and 3/5-attempt retry policies.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{exclusion::ExclusionPolicy, gateway::TableDefinition, resolver::RetryPolicy};

const STANDARD_TABLES: &[&str] = &[
    "LV.SCNTT0",
    "LV.SAVTT0",
    "LV.PRCTT0",
    "LV.SWBGT0",
    "LV.SCLST0",
    "LV.SCLRT0",
    "LV.BSPDT0",
    "LV.BSPGT0",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "ExclusionPolicy::standard")]
    pub exclusions: ExclusionPolicy,
    #[serde(default = "standard_tables")]
    pub tables: Vec<TableDefinition>,
    #[serde(default)]
    pub lookup: LookupSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn standard_tables() -> Vec<TableDefinition> {
    STANDARD_TABLES
        .iter()
        .map(|name| TableDefinition::by_internal_key(*name))
        .collect()
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            exclusions: ExclusionPolicy::standard(),
            tables: standard_tables(),
            lookup: LookupSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).with_context(|| format!("Parsing config {path:?}"))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing config YAML")
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Where the reference-to-key lookup and the product code live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    pub table: String,
    pub internal_key_column: String,
    pub external_reference_column: String,
    pub product_column: String,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            table: "LV.SCNTT0".to_string(),
            internal_key_column: "NO_CNT".to_string(),
            external_reference_column: "NO_CNT_EXTENDED".to_string(),
            product_column: "C_PROP_PRINC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// For records expected to exist already.
    pub routine: RetryPolicy,
    /// For records just produced by the duplication pipeline.
    pub fresh: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            routine: RetryPolicy::routine(),
            fresh: RetryPolicy::fresh(),
        }
    }
}
