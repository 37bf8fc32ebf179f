mod common;

use common::{FakeGateway, TestWorkspace, dataset};
use record_reconciler::data::Value;
use record_reconciler::gateway::{InternalKey, KeyKind, RecordKeys, TableDefinition};
use record_reconciler::snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, capture};

fn contract_rows(premium: f64) -> record_reconciler::data::Dataset {
    dataset(
        &["NO_CNT", "PREMIUM"],
        vec![vec![Value::from("K1"), Value::Float(premium)]],
    )
}

#[test]
fn capture_is_frozen_against_later_mutation() {
    let workspace = TestWorkspace::new();
    let gateway = FakeGateway::new().with_rows("LV.SCNTT0", "K1", contract_rows(10.0));
    let store = FileSnapshotStore::new(workspace.path().join("snapshots"));
    let table = TableDefinition::by_internal_key("LV.SCNTT0");
    let keys = RecordKeys::new("REF1", InternalKey::new("K1"));

    capture(&gateway, &store, &table, &keys).unwrap();
    gateway.set_rows("LV.SCNTT0", "K1", contract_rows(99.0));

    let snapshot = store.load("REF1", "LV.SCNTT0").unwrap().unwrap();
    assert_eq!(snapshot.dataset(), &contract_rows(10.0));
    assert_eq!(snapshot.reference(), "REF1");
    assert_eq!(snapshot.table(), "LV.SCNTT0");
}

#[test]
fn recapture_overwrites() {
    let gateway = FakeGateway::new().with_rows("LV.SCNTT0", "K1", contract_rows(10.0));
    let store = MemorySnapshotStore::new();
    let table = TableDefinition::by_internal_key("LV.SCNTT0");
    let keys = RecordKeys::new("REF1", InternalKey::new("K1"));

    capture(&gateway, &store, &table, &keys).unwrap();
    gateway.set_rows("LV.SCNTT0", "K1", contract_rows(12.5));
    capture(&gateway, &store, &table, &keys).unwrap();

    assert_eq!(store.len(), 1);
    let snapshot = store.load("REF1", "LV.SCNTT0").unwrap().unwrap();
    assert_eq!(snapshot.dataset(), &contract_rows(12.5));
}

#[test]
fn external_reference_tables_bind_the_reference() {
    let gateway = FakeGateway::new().with_rows("LV.PRCTT0", "REF1", contract_rows(1.5));
    let store = MemorySnapshotStore::new();
    let table = TableDefinition::new("LV.PRCTT0", KeyKind::ByExternalReference);
    let keys = RecordKeys::new("REF1", InternalKey::new("K1"));

    let snapshot = capture(&gateway, &store, &table, &keys).unwrap();
    assert_eq!(snapshot.dataset().row_count(), 1);
}

#[test]
fn gateway_fault_fails_the_capture_and_stores_nothing() {
    let gateway = FakeGateway::new().with_broken_table("LV.SCNTT0");
    let store = MemorySnapshotStore::new();
    let table = TableDefinition::by_internal_key("LV.SCNTT0");
    let keys = RecordKeys::new("REF1", InternalKey::new("K1"));

    let err = capture(&gateway, &store, &table, &keys).unwrap_err();
    assert!(format!("{err:#}").contains("connection reset"));
    assert!(store.is_empty());
}

#[test]
fn missing_snapshot_is_not_an_error() {
    let workspace = TestWorkspace::new();
    let store = FileSnapshotStore::new(workspace.path());
    assert!(store.load("nobody", "LV.SCNTT0").unwrap().is_none());
}
