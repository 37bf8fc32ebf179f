//! Duplication phase: freeze the source record, have the external pipeline
//! duplicate it, and wait for the duplicate's key to become visible.
//!
//! The output is the activation mapping that the reconciliation phase reads
//! back once the downstream batches have run.

use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    gateway::{InternalKey, QueryGateway, RecordKeys, TableDefinition},
    resolver::{IdentifierResolver, RetryPolicy, Sleeper, ThreadSleeper},
    snapshot::{SnapshotStore, capture},
};

/// The external pipeline that produces the duplicate of a record and
/// returns its new external reference.
pub trait Duplicator {
    fn duplicate(&self, source_reference: &str) -> Result<String>;
}

impl<F> Duplicator for F
where
    F: Fn(&str) -> Result<String>,
{
    fn duplicate(&self, source_reference: &str) -> Result<String> {
        self(source_reference)
    }
}

/// Stand-in for the real pipeline: the new reference is `prefix` followed by
/// the last `keep` characters of the source reference.
#[derive(Debug, Clone)]
pub struct PrefixDuplicator {
    prefix: String,
    keep: usize,
}

impl PrefixDuplicator {
    pub fn new(prefix: impl Into<String>, keep: usize) -> Self {
        Self {
            prefix: prefix.into(),
            keep,
        }
    }
}

impl Default for PrefixDuplicator {
    fn default() -> Self {
        Self::new("999", 6)
    }
}

impl Duplicator for PrefixDuplicator {
    fn duplicate(&self, source_reference: &str) -> Result<String> {
        let chars = source_reference.trim().chars().collect::<Vec<_>>();
        if chars.is_empty() {
            return Err(anyhow!("Cannot duplicate an empty reference"));
        }
        let start = chars.len().saturating_sub(self.keep);
        let tail = chars[start..].iter().collect::<String>();
        Ok(format!("{}{tail}", self.prefix))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationStatus {
    #[serde(rename = "OK_DUPLICATED")]
    Duplicated,
    #[serde(rename = "KO_DUPLICATION")]
    DuplicationFailed,
    #[serde(rename = "KO_NOT_FOUND")]
    TargetNotFound,
}

impl ActivationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationStatus::Duplicated => "OK_DUPLICATED",
            ActivationStatus::DuplicationFailed => "KO_DUPLICATION",
            ActivationStatus::TargetNotFound => "KO_NOT_FOUND",
        }
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationEntry {
    pub source_reference: String,
    pub target_reference: Option<String>,
    pub target_key: Option<InternalKey>,
    pub status: ActivationStatus,
    pub snapshots: usize,
    pub activated_at: NaiveDateTime,
    pub faults: Vec<String>,
}

pub struct Activator<'a, G: ?Sized, S: ?Sized, D: ?Sized> {
    gateway: &'a G,
    store: &'a S,
    duplicator: &'a D,
    tables: &'a [TableDefinition],
    source_policy: RetryPolicy,
    target_policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a, G, S, D> Activator<'a, G, S, D>
where
    G: QueryGateway + ?Sized,
    S: SnapshotStore + ?Sized,
    D: Duplicator + ?Sized,
{
    pub fn new(
        gateway: &'a G,
        store: &'a S,
        duplicator: &'a D,
        tables: &'a [TableDefinition],
    ) -> Self {
        Self {
            gateway,
            store,
            duplicator,
            tables,
            source_policy: RetryPolicy::single(),
            target_policy: RetryPolicy::fresh(),
            sleeper: &ThreadSleeper,
        }
    }

    /// Policy used to find the duplicate, which the pipeline may still be
    /// replicating.
    pub fn with_target_policy(mut self, policy: RetryPolicy) -> Self {
        self.target_policy = policy;
        self
    }

    pub fn with_source_policy(mut self, policy: RetryPolicy) -> Self {
        self.source_policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn activate_all<I, R>(&self, sources: I) -> Vec<ActivationEntry>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        sources
            .into_iter()
            .map(|source| self.activate(source.as_ref()))
            .collect()
    }

    pub fn activate(&self, source_reference: &str) -> ActivationEntry {
        let source_reference = source_reference.trim();
        info!("Activating {source_reference}");
        let resolver = IdentifierResolver::with_sleeper(self.gateway, self.sleeper);
        let mut faults = Vec::new();
        let mut snapshots = 0;

        match resolver.resolve(source_reference, &self.source_policy) {
            Ok(key) => {
                let keys = RecordKeys::new(source_reference, key);
                for table in self.tables {
                    match capture(self.gateway, self.store, table, &keys) {
                        Ok(_) => snapshots += 1,
                        Err(err) => {
                            let message = format!("snapshot of {} failed: {err:#}", table.name);
                            warn!("{source_reference}: {message}");
                            faults.push(message);
                        }
                    }
                }
            }
            Err(err) => {
                warn!("{source_reference}: no snapshot taken, {err}");
                faults.push(err.to_string());
            }
        }

        let mut entry = ActivationEntry {
            source_reference: source_reference.to_string(),
            target_reference: None,
            target_key: None,
            status: ActivationStatus::DuplicationFailed,
            snapshots,
            activated_at: Local::now().naive_local(),
            faults,
        };

        let target_reference = match self.duplicator.duplicate(source_reference) {
            Ok(reference) => reference,
            Err(err) => {
                error!("{source_reference}: duplication failed: {err:#}");
                entry.faults.push(format!("duplication failed: {err:#}"));
                return entry;
            }
        };
        info!("{source_reference} duplicated as {target_reference}");
        entry.target_reference = Some(target_reference.clone());

        match resolver.resolve(&target_reference, &self.target_policy) {
            Ok(key) => {
                entry.target_key = Some(key);
                entry.status = ActivationStatus::Duplicated;
            }
            Err(err) => {
                error!("{source_reference}: duplicate {target_reference} never became visible");
                entry.faults.push(err.to_string());
                entry.status = ActivationStatus::TargetNotFound;
            }
        }
        entry
    }
}
