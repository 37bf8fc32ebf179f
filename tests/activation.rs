mod common;

use std::time::Duration;

use anyhow::anyhow;
use common::{FakeGateway, RecordingSleeper, TestWorkspace, dataset};
use encoding_rs::UTF_8;
use record_reconciler::activation::{ActivationStatus, Activator, PrefixDuplicator};
use record_reconciler::data::Value;
use record_reconciler::gateway::{InternalKey, TableDefinition};
use record_reconciler::report::{read_mapping, write_activation};
use record_reconciler::resolver::RetryPolicy;
use record_reconciler::snapshot::{MemorySnapshotStore, SnapshotStore};

fn tables() -> Vec<TableDefinition> {
    vec![
        TableDefinition::by_internal_key("LV.SCNTT0"),
        TableDefinition::by_internal_key("LV.SAVTT0"),
    ]
}

fn source_gateway() -> FakeGateway {
    FakeGateway::new().with_record("100200", "K1").with_rows(
        "LV.SCNTT0",
        "K1",
        dataset(&["NO_CNT", "PREMIUM"], vec![vec![Value::from("K1"), Value::Float(3.5)]]),
    )
}

#[test]
fn duplicate_found_after_replication_lag() {
    let gateway = source_gateway().with_delayed_record("999200", "K2", 2);
    let store = MemorySnapshotStore::new();
    let duplicator = PrefixDuplicator::new("999", 3);
    let tables = tables();
    let sleeper = RecordingSleeper::default();

    let entry = Activator::new(&gateway, &store, &duplicator, &tables)
        .with_target_policy(RetryPolicy::new(5, Duration::from_millis(10)))
        .with_sleeper(&sleeper)
        .activate("100200");

    assert_eq!(entry.status, ActivationStatus::Duplicated);
    assert_eq!(entry.target_reference.as_deref(), Some("999200"));
    assert_eq!(entry.target_key, Some(InternalKey::new("K2")));
    assert_eq!(entry.snapshots, 2);
    assert!(entry.faults.is_empty());
    assert_eq!(sleeper.pauses().len(), 2);

    let snapshot = store.load("100200", "LV.SCNTT0").unwrap().unwrap();
    assert_eq!(snapshot.dataset().row_count(), 1);
    assert!(store.load("100200", "LV.SAVTT0").unwrap().is_some());
}

#[test]
fn duplication_failure_is_recorded() {
    let gateway = source_gateway();
    let store = MemorySnapshotStore::new();
    let duplicator = |_: &str| -> anyhow::Result<String> { Err(anyhow!("pipeline rejected")) };
    let tables = tables();
    let sleeper = RecordingSleeper::default();

    let entry = Activator::new(&gateway, &store, &duplicator, &tables)
        .with_sleeper(&sleeper)
        .activate("100200");

    assert_eq!(entry.status, ActivationStatus::DuplicationFailed);
    assert!(entry.target_reference.is_none());
    assert!(entry.faults[0].contains("pipeline rejected"));
    // The source was frozen before the pipeline ran.
    assert_eq!(store.len(), 2);
}

#[test]
fn invisible_duplicate_is_not_found() {
    let gateway = source_gateway();
    let store = MemorySnapshotStore::new();
    let duplicator = PrefixDuplicator::default();
    let tables = tables();
    let sleeper = RecordingSleeper::default();

    let entry = Activator::new(&gateway, &store, &duplicator, &tables)
        .with_target_policy(RetryPolicy::new(5, Duration::ZERO))
        .with_sleeper(&sleeper)
        .activate("100200");

    assert_eq!(entry.status, ActivationStatus::TargetNotFound);
    assert_eq!(entry.target_reference.as_deref(), Some("999100200"));
    assert!(entry.target_key.is_none());
    // One lookup for the source, five for the duplicate.
    assert_eq!(gateway.key_lookups(), 6);
}

#[test]
fn unknown_source_is_still_duplicated() {
    let gateway = FakeGateway::new().with_record("999777", "K9");
    let store = MemorySnapshotStore::new();
    let duplicator = PrefixDuplicator::new("999", 3);
    let tables = tables();
    let sleeper = RecordingSleeper::default();

    let entry = Activator::new(&gateway, &store, &duplicator, &tables)
        .with_sleeper(&sleeper)
        .activate(" 777 ");

    assert_eq!(entry.source_reference, "777");
    assert_eq!(entry.status, ActivationStatus::Duplicated);
    assert_eq!(entry.snapshots, 0);
    assert_eq!(entry.faults.len(), 1);
    assert!(store.is_empty());
}

#[test]
fn activation_mapping_feeds_reconciliation() {
    let workspace = TestWorkspace::new();
    let gateway = source_gateway().with_record("999200", "K2");
    let store = MemorySnapshotStore::new();
    let duplicator = PrefixDuplicator::new("999", 3);
    let failing = |_: &str| -> anyhow::Result<String> { Err(anyhow!("down")) };
    let tables = tables();
    let sleeper = RecordingSleeper::default();

    let mut entries = Activator::new(&gateway, &store, &duplicator, &tables)
        .with_sleeper(&sleeper)
        .activate_all(["100200"]);
    entries.extend(
        Activator::new(&gateway, &store, &failing, &tables)
            .with_sleeper(&sleeper)
            .activate_all(vec!["100300".to_string()]),
    );

    let path = workspace.path().join("activation.csv");
    write_activation(&path, &entries, b';', UTF_8).unwrap();
    let mapping = read_mapping(&path, b';', UTF_8).unwrap();

    assert_eq!(mapping.len(), 2);
    assert_eq!(mapping[0].source_reference, "100200");
    assert_eq!(mapping[0].target_reference, "999200");
    assert_eq!(mapping[0].activation_status.as_deref(), Some("OK_DUPLICATED"));
    assert_eq!(mapping[1].target_reference, "");
    assert_eq!(mapping[1].activation_status.as_deref(), Some("KO_DUPLICATION"));
}
