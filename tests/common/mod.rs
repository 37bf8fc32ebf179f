#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use record_reconciler::data::{Dataset, Value};
use record_reconciler::gateway::{GatewayError, KeyParam, Query, QueryGateway};
use record_reconciler::resolver::Sleeper;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
    let mut dataset = Dataset::new(columns.iter().map(|c| c.to_string()).collect());
    for row in rows {
        dataset.push_row(row).expect("row width matches columns");
    }
    dataset
}

/// In-memory record store keyed the same way the CSV gateway is.
#[derive(Default)]
pub struct FakeGateway {
    keys: RefCell<HashMap<String, String>>,
    products: HashMap<String, String>,
    tables: RefCell<HashMap<(String, String), Dataset>>,
    broken_tables: HashSet<String>,
    broken_products: bool,
    /// Lookups of a reference that return nothing before its key shows up.
    pending: RefCell<HashMap<String, u32>>,
    key_lookups: Cell<u32>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, reference: &str, key: &str) -> Self {
        self.keys
            .borrow_mut()
            .insert(reference.to_string(), key.to_string());
        self
    }

    pub fn with_product(mut self, key: &str, product: &str) -> Self {
        self.products.insert(key.to_string(), product.to_string());
        self
    }

    pub fn with_rows(self, table: &str, key: &str, rows: Dataset) -> Self {
        self.set_rows(table, key, rows);
        self
    }

    pub fn with_broken_table(mut self, table: &str) -> Self {
        self.broken_tables.insert(table.to_string());
        self
    }

    pub fn with_broken_products(mut self) -> Self {
        self.broken_products = true;
        self
    }

    /// The key of `reference` becomes visible only after `misses` lookups.
    pub fn with_delayed_record(self, reference: &str, key: &str, misses: u32) -> Self {
        self.pending
            .borrow_mut()
            .insert(reference.to_string(), misses);
        self.with_record(reference, key)
    }

    /// Replaces the live rows, as a batch touching the record would.
    pub fn set_rows(&self, table: &str, key: &str, rows: Dataset) {
        self.tables
            .borrow_mut()
            .insert((table.to_string(), key.to_string()), rows);
    }

    pub fn key_lookups(&self) -> u32 {
        self.key_lookups.get()
    }
}

impl QueryGateway for FakeGateway {
    fn execute(&self, query: &Query) -> Result<Dataset, GatewayError> {
        match query {
            Query::InternalKey { reference } => {
                self.key_lookups.set(self.key_lookups.get() + 1);
                if let Some(misses) = self.pending.borrow_mut().get_mut(reference)
                    && *misses > 0
                {
                    *misses -= 1;
                    return Ok(Dataset::new(vec!["NO_CNT".to_string()]));
                }
                let rows = self
                    .keys
                    .borrow()
                    .get(reference)
                    .map(|key| vec![vec![Value::from(key.as_str())]])
                    .unwrap_or_default();
                Ok(dataset(&["NO_CNT"], rows))
            }
            Query::ProductCode { key } => {
                if self.broken_products {
                    return Err(GatewayError::Query {
                        query: query.to_string(),
                        message: "timeout".to_string(),
                    });
                }
                let rows = self
                    .products
                    .get(key.as_str())
                    .map(|code| vec![vec![Value::from(code.as_str())]])
                    .unwrap_or_default();
                Ok(dataset(&["C_PROP_PRINC"], rows))
            }
            Query::Table { table, key } => {
                if self.broken_tables.contains(table) {
                    return Err(GatewayError::Query {
                        query: query.to_string(),
                        message: "connection reset".to_string(),
                    });
                }
                let key = match key {
                    KeyParam::Internal(key) => key.as_str().to_string(),
                    KeyParam::External(reference) => reference.clone(),
                };
                Ok(self
                    .tables
                    .borrow()
                    .get(&(table.clone(), key))
                    .cloned()
                    .unwrap_or_default())
            }
        }
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}
