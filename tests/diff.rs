mod common;

use common::dataset;
use record_reconciler::data::{NULL_MARKER, Value};
use record_reconciler::diff::{DiffEngine, Verdict};
use record_reconciler::exclusion::ExclusionPolicy;

fn engine() -> DiffEngine {
    DiffEngine::new(ExclusionPolicy::empty())
}

#[test]
fn cosmetic_differences_compare_ok() {
    let source = dataset(
        &["id", "name", "amt"],
        vec![vec![Value::Integer(1), "Foo ".into(), 10.00001.into()]],
    );
    let target = dataset(
        &["id", "name", "amt"],
        vec![vec![Value::Integer(1), "Foo".into(), 10.00002.into()]],
    );

    let comparison = engine().compare(&source, &target, "T");
    assert_eq!(comparison.verdict, Verdict::Ok);
    assert!(comparison.detail.is_none());
}

#[test]
fn row_count_mismatch_cites_both_counts() {
    let source = dataset(
        &["id", "name"],
        vec![vec![Value::Integer(1), "a".into()], vec![Value::Integer(2), "b".into()]],
    );
    let target = dataset(&["id", "name"], vec![vec![Value::Integer(1), "a".into()]]);

    let comparison = engine().compare(&source, &target, "T");
    assert_eq!(comparison.verdict, Verdict::KoRowCount);
    let diagnostic = comparison.diagnostic().expect("diagnostic");
    assert!(diagnostic.contains('2'));
    assert!(diagnostic.contains('1'));
    assert!(comparison.differences().is_empty());

    let reversed = engine().compare(&target, &source, "T");
    assert_eq!(reversed.verdict, Verdict::KoRowCount);
}

#[test]
fn only_excluded_columns_in_common() {
    let policy = ExclusionPolicy::empty()
        .with_global(["D_MOD"])
        .with_table("LV.SCLST0", ["NO_ORD_CLS"]);
    let source = dataset(
        &["D_MOD", "NO_ORD_CLS", "only_source"],
        vec![vec!["x".into(), Value::Integer(1), Value::Integer(2)]],
    );
    let target = dataset(
        &["D_MOD", "NO_ORD_CLS", "only_target"],
        vec![vec!["y".into(), Value::Integer(3), Value::Integer(4)]],
    );

    let comparison = DiffEngine::new(policy.clone()).compare(&source, &target, "LV.SCLST0");
    assert_eq!(comparison.verdict, Verdict::KoNoCommonCols);

    // The table-specific rule does not apply elsewhere.
    let elsewhere = DiffEngine::new(policy).compare(&source, &target, "LV.SCNTT0");
    assert_eq!(elsewhere.verdict, Verdict::Ko);
}

#[test]
fn nan_literal_matches_null() {
    let source = dataset(&["k", "v"], vec![vec![Value::Integer(1), "nan".into()]]);
    let target = dataset(&["k", "v"], vec![vec![Value::Integer(1), Value::Null]]);
    assert_eq!(engine().compare(&source, &target, "T").verdict, Verdict::Ok);

    let padded = dataset(&["k", "v"], vec![vec![Value::Integer(1), "  X ".into()]]);
    let plain = dataset(&["k", "v"], vec![vec![Value::Integer(1), "X".into()]]);
    assert_eq!(engine().compare(&padded, &plain, "T").verdict, Verdict::Ok);
}

#[test]
fn rounding_is_applied_per_side() {
    let source = dataset(&["x"], vec![vec![1.00004999.into()]]);
    let target = dataset(&["x"], vec![vec![1.00005001.into()]]);

    let comparison = engine().compare(&source, &target, "T");
    assert_eq!(comparison.verdict, Verdict::Ko);
    let cells = comparison.differences();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].source.as_deref(), Some("1"));
    assert_eq!(cells[0].target.as_deref(), Some("1.0001"));
}

#[test]
fn differences_list_every_cell_with_null_marker() {
    let source = dataset(
        &["id", "a", "b"],
        vec![vec![Value::Integer(1), "x".into(), Value::Null]],
    );
    let target = dataset(
        &["id", "a", "b"],
        vec![vec![Value::Integer(1), "y".into(), "".into()]],
    );
    // Blank text normalizes to null, so only column `a` differs.
    let comparison = engine().compare(&source, &target, "T");
    assert_eq!(comparison.verdict, Verdict::Ko);
    assert_eq!(comparison.differences().len(), 1);
    assert_eq!(comparison.differences()[0].column, "a");

    let source = dataset(&["id", "a"], vec![vec![Value::Integer(1), Value::Null]]);
    let target = dataset(&["id", "a"], vec![vec![Value::Integer(1), "z".into()]]);
    let comparison = engine().compare(&source, &target, "T");
    let cell = &comparison.differences()[0];
    assert_eq!(cell.source_text(), NULL_MARKER);
    assert_eq!(cell.target_text(), "z");
    assert!(cell.to_string().contains(NULL_MARKER));
}

#[test]
fn row_order_does_not_matter() {
    let source = dataset(
        &["id", "name"],
        vec![vec![Value::Integer(2), "b".into()], vec![Value::Integer(1), "a".into()]],
    );
    let target = dataset(
        &["name", "id"],
        vec![vec!["a".into(), Value::Integer(1)], vec!["b".into(), Value::Integer(2)]],
    );
    assert_eq!(engine().compare(&source, &target, "T").verdict, Verdict::Ok);
}

#[test]
fn emptiness_is_checked_first() {
    let empty = dataset(&["id"], vec![]);
    let full = dataset(&["id"], vec![vec![Value::Integer(1)]]);

    assert_eq!(engine().compare(&empty, &empty, "T").verdict, Verdict::OkEmpty);
    let missing = engine().compare(&full, &empty, "LV.SAVTT0");
    assert_eq!(missing.verdict, Verdict::KoMissingData);
    assert!(missing.diagnostic().unwrap().contains("LV.SAVTT0"));
}

#[test]
fn unsortable_column_degrades_to_warning() {
    let source = dataset(
        &["id", "mixed"],
        vec![vec![Value::Integer(1), "text".into()], vec![Value::Integer(2), Value::Integer(5)]],
    );
    let comparison = engine().compare(&source, &source.clone(), "T");
    assert_eq!(comparison.verdict, Verdict::Ok);
    assert_eq!(comparison.warnings.len(), 2);
    assert!(comparison.warnings[0].contains("unsorted"));
}

#[test]
fn verdict_labels_classify_failures() {
    for verdict in [
        Verdict::Ko,
        Verdict::KoMissingData,
        Verdict::KoNoCommonCols,
        Verdict::KoRowCount,
        Verdict::KoError,
    ] {
        assert!(!verdict.is_success());
        assert!(record_reconciler::diff::is_failure_label(verdict.as_str()));
    }
    assert!(Verdict::Ok.is_success());
    assert!(Verdict::OkEmpty.is_success());
    assert!(!record_reconciler::diff::is_failure_label("OK_EMPTY"));
}

#[test]
fn negative_zero_noise_keeps_rows_aligned() {
    let source = dataset(
        &["amount", "name"],
        vec![
            vec![Value::Float(-0.00001), "b".into()],
            vec![Value::Float(0.0), "a".into()],
        ],
    );
    let target = dataset(
        &["amount", "name"],
        vec![
            vec![Value::Float(0.0), "b".into()],
            vec![Value::Float(0.0), "a".into()],
        ],
    );

    let comparison = engine().compare(&source, &target, "T");
    assert_eq!(comparison.verdict, Verdict::Ok);
    assert!(comparison.differences().is_empty());
}

#[test]
fn repeated_excluded_header_is_dropped_silently() {
    let source = dataset(
        &["id", "D_MOD", "D_MOD"],
        vec![vec![Value::Integer(1), "x".into(), "y".into()]],
    );
    let target = dataset(&["id", "D_MOD"], vec![vec![Value::Integer(1), "z".into()]]);

    let engine = DiffEngine::new(ExclusionPolicy::empty().with_global(["D_MOD"]));
    assert_eq!(engine.compare(&source, &target, "T").verdict, Verdict::Ok);
}

#[test]
fn one_unsortable_side_keeps_both_in_input_order() {
    let source = dataset(
        &["id", "mixed"],
        vec![
            vec![Value::Integer(2), "text".into()],
            vec![Value::Integer(1), Value::Integer(5)],
        ],
    );
    let target = dataset(
        &["id", "mixed"],
        vec![
            vec![Value::Integer(2), Value::Integer(4)],
            vec![Value::Integer(1), Value::Integer(5)],
        ],
    );

    let comparison = engine().compare(&source, &target, "T");
    assert_eq!(comparison.verdict, Verdict::Ko);
    assert_eq!(comparison.warnings.len(), 1);
    assert!(comparison.warnings[0].starts_with("source rows of T"));
    // Rows stay paired as given, so only the one mixed cell differs.
    let cells = comparison.differences();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].row, 0);
    assert_eq!(cells[0].column, "mixed");
}
