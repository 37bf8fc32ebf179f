//! Record-by-record verification of duplicates against their sources.
//!
//! For each mapping entry the reconciler resolves both internal keys, then
//! compares every configured table: the source side comes from its snapshot
//! when one exists, the target side is always queried live. A failure stays
//! with its record; the run always moves on to the next one and every record
//! ends up in the output with an explicit status.

use std::{fmt, sync::OnceLock};

use log::{error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    data::Dataset,
    diff::{Comparison, DiffEngine},
    gateway::{InternalKey, Query, QueryGateway, RecordKeys, TableDefinition},
    resolver::{IdentifierResolver, RetryPolicy, Sleeper, ThreadSleeper},
    snapshot::SnapshotStore,
};

pub const UNKNOWN_PRODUCT: &str = "UNKNOWN";
pub const PRODUCT_LOOKUP_FAILED: &str = "ERROR_PROD";

/// One line of the activation mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_reference: String,
    pub target_reference: String,
    /// Activation status, when the mapping carries one.
    #[serde(default)]
    pub activation_status: Option<String>,
}

impl MappingEntry {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_reference: source.into(),
            target_reference: target.into(),
            activation_status: None,
        }
    }

    pub fn with_activation_status(mut self, status: impl Into<String>) -> Self {
        self.activation_status = Some(status.into());
        self
    }

    fn activation_failed(&self) -> bool {
        self.activation_status
            .as_deref()
            .map(str::trim)
            .is_some_and(|status| !status.to_ascii_uppercase().starts_with("OK"))
    }
}

/// Trims a reference and drops the `.0` a spreadsheet appends to numbers.
pub fn clean_reference(raw: &str) -> String {
    static FLOAT_ARTIFACT: OnceLock<Option<Regex>> = OnceLock::new();
    let trimmed = raw.trim();
    FLOAT_ARTIFACT
        .get_or_init(|| Regex::new(r"^(\d+)\.0+$").ok())
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
    #[serde(rename = "ERROR_ID")]
    Unresolved,
    #[serde(rename = "SKIP_ACTIVATION_KO")]
    SkippedActivation,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Ok => "OK",
            RecordStatus::Ko => "KO",
            RecordStatus::Unresolved => "ERROR_ID",
            RecordStatus::SkippedActivation => "SKIP_ACTIVATION_KO",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOrigin {
    #[serde(rename = "SNAPSHOT")]
    Snapshot,
    #[serde(rename = "LIVE")]
    Live,
}

impl SourceOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceOrigin::Snapshot => "SNAPSHOT",
            SourceOrigin::Live => "LIVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub origin: SourceOrigin,
    pub comparison: Comparison,
    /// Suppressed faults met while loading either side.
    pub faults: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Disposition {
    Compared,
    Unresolved,
    SkippedActivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMapping {
    pub source_reference: String,
    pub target_reference: String,
    pub source_key: Option<InternalKey>,
    pub target_key: Option<InternalKey>,
    pub product: String,
    pub tables: Vec<TableOutcome>,
    pub faults: Vec<String>,
    disposition: Disposition,
}

impl RecordMapping {
    fn new(entry: &MappingEntry, disposition: Disposition) -> Self {
        Self {
            source_reference: entry.source_reference.clone(),
            target_reference: entry.target_reference.clone(),
            source_key: None,
            target_key: None,
            product: UNKNOWN_PRODUCT.to_string(),
            tables: Vec::new(),
            faults: Vec::new(),
            disposition,
        }
    }

    /// Derived: `OK` only when every table verdict is a success.
    pub fn status(&self) -> RecordStatus {
        match self.disposition {
            Disposition::Unresolved => RecordStatus::Unresolved,
            Disposition::SkippedActivation => RecordStatus::SkippedActivation,
            Disposition::Compared => {
                if self
                    .tables
                    .iter()
                    .all(|outcome| outcome.comparison.verdict.is_success())
                {
                    RecordStatus::Ok
                } else {
                    RecordStatus::Ko
                }
            }
        }
    }
}

pub struct Reconciler<'a, G: ?Sized, S: ?Sized> {
    gateway: &'a G,
    store: &'a S,
    engine: &'a DiffEngine,
    tables: &'a [TableDefinition],
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a, G, S> Reconciler<'a, G, S>
where
    G: QueryGateway + ?Sized,
    S: SnapshotStore + ?Sized,
{
    pub fn new(
        gateway: &'a G,
        store: &'a S,
        engine: &'a DiffEngine,
        tables: &'a [TableDefinition],
    ) -> Self {
        Self {
            gateway,
            store,
            engine,
            tables,
            policy: RetryPolicy::routine(),
            sleeper: &ThreadSleeper,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Reconciles every entry in order. Entries with a blank reference are
    /// not records and are skipped, unless their activation failed, in which
    /// case the failure itself is reported.
    pub fn run(&self, entries: &[MappingEntry]) -> Vec<RecordMapping> {
        let total = entries.len();
        let mut records = Vec::with_capacity(total);
        for (idx, entry) in entries.iter().enumerate() {
            let entry = MappingEntry {
                source_reference: clean_reference(&entry.source_reference),
                target_reference: clean_reference(&entry.target_reference),
                activation_status: entry.activation_status.clone(),
            };
            let blank_target = entry.target_reference.is_empty() && !entry.activation_failed();
            if entry.source_reference.is_empty() || blank_target {
                warn!("Line {} has a blank reference, skipped", idx + 1);
                continue;
            }
            info!(
                "[{}/{total}] {} (source) vs {} (target)",
                idx + 1,
                entry.source_reference,
                entry.target_reference
            );
            records.push(self.reconcile(&entry));
        }
        records
    }

    pub fn reconcile(&self, entry: &MappingEntry) -> RecordMapping {
        if entry.activation_failed() {
            let status = entry.activation_status.as_deref().unwrap_or_default();
            warn!(
                "{} skipped, activation ended with {status}",
                entry.source_reference
            );
            let mut record = RecordMapping::new(entry, Disposition::SkippedActivation);
            record.faults.push(format!("activation status {status}"));
            return record;
        }

        let resolver = IdentifierResolver::with_sleeper(self.gateway, self.sleeper);
        let mut record = RecordMapping::new(entry, Disposition::Unresolved);
        let source_key = resolver.resolve(&entry.source_reference, &self.policy);
        let target_key = resolver.resolve(&entry.target_reference, &self.policy);
        let (source_key, target_key) = match (source_key, target_key) {
            (Ok(source), Ok(target)) => (source, target),
            (source, target) => {
                record.source_key = source.as_ref().ok().cloned();
                record.target_key = target.as_ref().ok().cloned();
                for err in [source.err(), target.err()].into_iter().flatten() {
                    warn!("{err}");
                    record.faults.push(err.to_string());
                }
                return record;
            }
        };

        record.disposition = Disposition::Compared;
        record.product = self.product_code(&source_key);
        let source = RecordKeys::new(&entry.source_reference, source_key.clone());
        let target = RecordKeys::new(&entry.target_reference, target_key.clone());
        record.source_key = Some(source_key);
        record.target_key = Some(target_key);

        for table in self.tables {
            let outcome = self.compare_table(table, &source, &target);
            if !outcome.comparison.verdict.is_success() {
                error!(
                    "{} failed on {}: {}",
                    entry.source_reference, table.name, outcome.comparison.verdict
                );
            }
            record.tables.push(outcome);
        }
        info!("{} -> {}", entry.source_reference, record.status());
        record
    }

    fn compare_table(
        &self,
        table: &TableDefinition,
        source: &RecordKeys,
        target: &RecordKeys,
    ) -> TableOutcome {
        let mut faults = Vec::new();
        let (source_rows, origin) = match self.store.load(&source.reference, &table.name) {
            Ok(Some(snapshot)) => (snapshot.into_dataset(), SourceOrigin::Snapshot),
            Ok(None) => {
                info!(
                    "No snapshot of {} for {}, querying the live source",
                    table.name, source.reference
                );
                (self.live(table, source, &mut faults), SourceOrigin::Live)
            }
            Err(err) => {
                let message = format!("snapshot unreadable: {err:#}");
                warn!("{}: {message}", source.reference);
                faults.push(message);
                (self.live(table, source, &mut faults), SourceOrigin::Live)
            }
        };
        let target_rows = self.live(table, target, &mut faults);
        let comparison = self.engine.compare(&source_rows, &target_rows, &table.name);
        TableOutcome {
            origin,
            comparison,
            faults,
        }
    }

    /// Live rows for one side; a gateway fault reads as no rows.
    fn live(&self, table: &TableDefinition, keys: &RecordKeys, faults: &mut Vec<String>) -> Dataset {
        let query = table.bind(keys);
        match self.gateway.execute(&query) {
            Ok(dataset) => dataset,
            Err(err) => {
                let message = format!("{query}: {err}");
                warn!("{message}");
                faults.push(message);
                Dataset::default()
            }
        }
    }

    fn product_code(&self, key: &InternalKey) -> String {
        let query = Query::ProductCode { key: key.clone() };
        match self.gateway.execute(&query) {
            Ok(dataset) => dataset
                .scalar()
                .and_then(|value| value.as_display())
                .map(|code| code.trim().to_string())
                .filter(|code| !code.is_empty())
                .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
            Err(err) => {
                warn!("Product lookup for {key} failed: {err}");
                PRODUCT_LOOKUP_FAILED.to_string()
            }
        }
    }
}
