//! Point-in-time captures of a record's rows, keyed by (reference, table).
//!
//! A snapshot is taken while the source record is duplicated and read back
//! when the duplicate is verified, possibly days later. Once written it is
//! ground truth for that pair; a later capture replaces it wholesale.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDateTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    data::Dataset,
    gateway::{QueryGateway, RecordKeys, TableDefinition},
};

const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_EXTENSION: &str = "snap";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    reference: String,
    table: String,
    captured_at: NaiveDateTime,
    digest: String,
    dataset: Dataset,
}

impl Snapshot {
    pub fn new(reference: &str, table: &str, dataset: Dataset) -> Result<Self> {
        let digest = dataset_digest(&dataset)?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            reference: reference.to_string(),
            table: table.to_string(),
            captured_at: Local::now().naive_local(),
            digest,
            dataset,
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    /// Checks the format version and that the rows still hash to the digest
    /// recorded at capture time.
    pub fn verify(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                self.version
            ));
        }
        let actual = dataset_digest(&self.dataset)?;
        if actual != self.digest {
            return Err(anyhow!(
                "Snapshot digest mismatch for {} / {}",
                self.reference,
                self.table
            ));
        }
        Ok(())
    }
}

fn dataset_digest(dataset: &Dataset) -> Result<String> {
    let bytes = bincode::serde::encode_to_vec(dataset, bincode::config::standard())
        .context("Encoding dataset for digest")?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Persistence for snapshots. Implementations must tolerate concurrent
/// access to different keys.
pub trait SnapshotStore {
    /// Stores `snapshot`, replacing any earlier capture of the same pair.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Returns the capture for the pair, `None` when there is none.
    fn load(&self, reference: &str, table: &str) -> Result<Option<Snapshot>>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for &S {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).save(snapshot)
    }

    fn load(&self, reference: &str, table: &str) -> Result<Option<Snapshot>> {
        (**self).load(reference, table)
    }
}

/// One bincode file per (reference, table) under a root directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<reference>_<table>.snap`, each component percent-escaped so that
    /// distinct pairs never share a file.
    pub fn path_for(&self, reference: &str, table: &str) -> PathBuf {
        self.root.join(format!(
            "{}_{}.{SNAPSHOT_EXTENSION}",
            escape_component(reference),
            escape_component(table)
        ))
    }
}

// The escape set covers `_` and `%`, so the separator is unambiguous.
fn escape_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for byte in component.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("%{byte:02X}")),
        }
    }
    escaped
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Creating snapshot directory {:?}", self.root))?;
        let path = self.path_for(&snapshot.reference, &snapshot.table);
        let staging = path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));
        {
            let file = File::create(&staging)
                .with_context(|| format!("Creating snapshot file {staging:?}"))?;
            let mut writer = BufWriter::new(file);
            bincode::serde::encode_into_std_write(
                snapshot,
                &mut writer,
                bincode::config::standard(),
            )
            .with_context(|| format!("Writing snapshot {staging:?}"))?;
            writer
                .flush()
                .with_context(|| format!("Flushing snapshot {staging:?}"))?;
        }
        fs::rename(&staging, &path)
            .with_context(|| format!("Replacing snapshot {path:?}"))?;
        debug!("Snapshot written to {path:?}");
        Ok(())
    }

    fn load(&self, reference: &str, table: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(reference, table);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("Opening snapshot {path:?}"))?;
        let (snapshot, _): (Snapshot, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .with_context(|| format!("Decoding snapshot {path:?}"))?;
        snapshot
            .verify()
            .with_context(|| format!("Verifying snapshot {path:?}"))?;
        if snapshot.reference != reference || snapshot.table != table {
            return Err(anyhow!(
                "Snapshot {path:?} holds {} / {}, expected {reference} / {table}",
                snapshot.reference,
                snapshot.table
            ));
        }
        Ok(Some(snapshot))
    }
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<(String, String), Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Snapshot store lock poisoned"))?;
        entries.insert(
            (snapshot.reference.clone(), snapshot.table.clone()),
            snapshot.clone(),
        );
        Ok(())
    }

    fn load(&self, reference: &str, table: &str) -> Result<Option<Snapshot>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Snapshot store lock poisoned"))?;
        Ok(entries
            .get(&(reference.to_string(), table.to_string()))
            .cloned())
    }
}

/// Fetches the current rows of `table` for one record and stores them under
/// the record's external reference, overwriting any earlier capture.
pub fn capture<G, S>(
    gateway: &G,
    store: &S,
    table: &TableDefinition,
    keys: &RecordKeys,
) -> Result<Snapshot>
where
    G: QueryGateway + ?Sized,
    S: SnapshotStore + ?Sized,
{
    let query = table.bind(keys);
    let dataset = gateway
        .execute(&query)
        .with_context(|| format!("Fetching {query}"))?;
    let snapshot = Snapshot::new(&keys.reference, &table.name, dataset)?;
    store.save(&snapshot)?;
    info!(
        "Captured {} row(s) of {} for {}",
        snapshot.dataset.row_count(),
        table.name,
        keys.reference
    );
    Ok(snapshot)
}
