mod support;

use datatracker_core::{ConvertError, RunError, EXIT_FAILURE};
use support::{FixedInspector, Harness, RecordingConverter};

#[test]
fn resume_over_fully_processed_inputs_converts_nothing() {
    let harness = Harness::new();
    harness.touch("1234abc001/roads.shp");
    harness.touch("1234abc001/site.kml");
    let features = ["Points", "Lines"];

    let (_, first) = harness.run_simple(
        false,
        &mut RecordingConverter::default(),
        &mut FixedInspector::with(&features),
    );
    assert_eq!(first.unwrap().summary.created, 3);

    let mut converter = RecordingConverter::default();
    let (ledger, second) =
        harness.run_simple(true, &mut converter, &mut FixedInspector::with(&features));
    let report = second.unwrap();

    assert!(converter.converted.is_empty());
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.created, 0);
    assert_eq!(ledger.len(), 3);
    assert_eq!(harness.stored().len(), 3);
}

#[test]
fn resume_converts_only_unprocessed_entries_of_a_partial_container() {
    let harness = Harness::new();
    harness.touch("1234abc001/site.kml");
    let features = ["Points", "Polygons", "Lines"];

    let mut failing = RecordingConverter::failing(
        "1234_ABC_001_02",
        ConvertError::Tool("self-intersecting polygon".to_string()),
    );
    let (_, first) = harness.run_simple(false, &mut failing, &mut FixedInspector::with(&features));
    assert_eq!(first.unwrap().summary.failed, 1);
    assert!(!harness.stored().get("1234_ABC_001_02").unwrap().processed);

    let mut converter = RecordingConverter::default();
    let (ledger, second) =
        harness.run_simple(true, &mut converter, &mut FixedInspector::with(&features));
    let report = second.unwrap();

    assert_eq!(converter.converted_ids(), ["1234_ABC_001_02"]);
    assert_eq!(report.summary.created, 0);
    assert_eq!(report.summary.reused, 3);
    assert_eq!(ledger.len(), 3);
    assert!(harness
        .stored()
        .entries()
        .all(|entry| entry.processed && entry.in_output_store));
}

#[test]
fn fatal_error_checkpoints_partial_progress_and_exits_with_failure() {
    let harness = Harness::new();
    harness.touch("1234abc001/site.kml");
    harness.touch("1234abc001/zz_later.shp");

    let mut converter = RecordingConverter::failing(
        "1234_ABC_001_02",
        ConvertError::Fatal("output store is locked".to_string()),
    );
    let (_, result) = harness.run_simple(
        false,
        &mut converter,
        &mut FixedInspector::with(&["Points", "Polygons", "Lines"]),
    );

    let err = result.unwrap_err();
    assert!(matches!(err, RunError::Aborted(_)));
    assert_eq!(err.exit_code(), EXIT_FAILURE);

    let stored = harness.stored();
    assert_eq!(stored.len(), 3);
    assert!(stored.get("1234_ABC_001_01").unwrap().processed);
    assert!(!stored.get("1234_ABC_001_02").unwrap().processed);
    assert!(!stored.get("1234_ABC_001_03").unwrap().processed);
    assert!(!stored.contains("1234_ABC_001_04"));
}

#[test]
fn resume_after_checkpoint_finishes_without_new_identifiers() {
    let harness = Harness::new();
    harness.touch("1234abc001/site.kml");
    harness.touch("1234abc001/zz_later.shp");
    let features = ["Points", "Polygons", "Lines"];

    let mut fatal = RecordingConverter::failing(
        "1234_ABC_001_02",
        ConvertError::Fatal("output store is locked".to_string()),
    );
    let (_, aborted) = harness.run_simple(false, &mut fatal, &mut FixedInspector::with(&features));
    assert!(aborted.is_err());

    let mut converter = RecordingConverter::default();
    let (ledger, resumed) =
        harness.run_simple(true, &mut converter, &mut FixedInspector::with(&features));
    resumed.unwrap();

    assert_eq!(
        converter.converted_ids(),
        ["1234_ABC_001_02", "1234_ABC_001_03", "1234_ABC_001_04"]
    );
    assert_eq!(ledger.len(), 4);
    assert!(ledger.entries().all(|entry| entry.processed));
}
