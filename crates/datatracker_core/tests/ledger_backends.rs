use datatracker_core::{
    migrate, CsvLedgerBackend, Entry, EntryPatch, EntryType, Ledger, LedgerBackend, Registry,
    SqliteLedgerBackend,
};
use std::path::Path;

fn entry(identifier: &str, natural_key: &str, raw: &str) -> Entry {
    let mut entry = Entry::new(identifier, natural_key, EntryType::Spatial);
    entry.raw_relative_path = raw.to_string();
    entry.raw_container_path = raw.to_string();
    entry.absolute_source_path = format!("/data/in/{raw}");
    entry
}

fn sample_ledger() -> Ledger {
    let mut ledger = Ledger::new();
    ledger.add(entry("1234_ABC_001_01", "1234 ABC - 001", "1234abc001/roads.shp"));

    let mut sheet = entry("1234_ABC_001_02", "1234 ABC - 001", "1234abc001/report.pdf");
    sheet.entry_type = EntryType::Aspatial;
    sheet.contains_pdf = true;
    sheet.processed = true;
    sheet.extracted_attachments_path = Some("attachments/1234_ABC_001_02".to_string());
    ledger.add(sheet);
    ledger
}

fn seeded_database(path: &Path) -> SqliteLedgerBackend {
    let backend = SqliteLedgerBackend::new(path);
    backend
        .seed_registry(&Registry::new(["1234 ABC - 001"]))
        .unwrap();
    backend
}

fn loaded(backend: &dyn LedgerBackend) -> Ledger {
    let mut ledger = Ledger::new();
    ledger.load(backend).unwrap();
    ledger
}

#[test]
fn file_backend_round_trips_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let backend = CsvLedgerBackend::new(dir.path().join("ledger.csv"));
    let ledger = sample_ledger();

    let report = ledger.save(&backend, false).unwrap();
    assert_eq!(report.inserted, 2);
    assert!(report.is_clean());

    let reloaded = loaded(&backend);
    assert_eq!(
        reloaded.entries().cloned().collect::<Vec<_>>(),
        ledger.entries().cloned().collect::<Vec<_>>()
    );
}

#[test]
fn file_backend_save_rewrites_whole_store() {
    let dir = tempfile::tempdir().unwrap();
    let backend = CsvLedgerBackend::new(dir.path().join("ledger.csv"));

    let mut ledger = sample_ledger();
    ledger.save(&backend, false).unwrap();
    ledger
        .set(
            "1234_ABC_001_01",
            &EntryPatch {
                processed: Some(true),
                ..EntryPatch::default()
            },
        )
        .unwrap();
    ledger.save(&backend, true).unwrap();

    let reloaded = loaded(&backend);
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.get("1234_ABC_001_01").unwrap().processed);
}

#[test]
fn relational_backend_round_trips_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let backend = seeded_database(&dir.path().join("ledger.db"));
    let ledger = sample_ledger();

    let report = ledger.save(&backend, false).unwrap();
    assert_eq!(report.inserted, 2);

    let reloaded = loaded(&backend);
    assert_eq!(
        reloaded.entries().cloned().collect::<Vec<_>>(),
        ledger.entries().cloned().collect::<Vec<_>>()
    );
}

#[test]
fn relational_save_without_update_never_rewrites_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let backend = seeded_database(&dir.path().join("ledger.db"));
    let mut ledger = sample_ledger();
    ledger.save(&backend, false).unwrap();

    ledger
        .set(
            "1234_ABC_001_01",
            &EntryPatch {
                processed: Some(true),
                ..EntryPatch::default()
            },
        )
        .unwrap();
    let report = ledger.save(&backend, false).unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped, 2);
    assert!(!loaded(&backend).get("1234_ABC_001_01").unwrap().processed);
}

#[test]
fn relational_save_with_update_rewrites_only_mutable_columns() {
    let dir = tempfile::tempdir().unwrap();
    let backend = seeded_database(&dir.path().join("ledger.db"));
    let mut ledger = sample_ledger();
    ledger.save(&backend, false).unwrap();

    ledger
        .set(
            "1234_ABC_001_01",
            &EntryPatch {
                processed: Some(true),
                in_output_store: Some(true),
                raw_relative_path: Some("moved/roads.shp".to_string()),
                ..EntryPatch::default()
            },
        )
        .unwrap();
    let report = ledger.save(&backend, true).unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 2);
    assert!(report.is_clean());

    let reloaded = loaded(&backend);
    let stored = reloaded.get("1234_ABC_001_01").unwrap();
    assert!(stored.processed);
    assert!(stored.in_output_store);
    assert_eq!(stored.raw_relative_path, "1234abc001/roads.shp");
}

#[test]
fn relational_save_reports_failing_rows_and_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let backend = seeded_database(&dir.path().join("ledger.db"));

    let mut ledger = Ledger::new();
    ledger.add(entry("1234_ABC_001_01", "1234 ABC - 001", "a.shp"));
    ledger.add(entry("5555_QQQ_555_01", "5555 QQQ - 555", "b.shp"));
    ledger.add(entry("0000_XXX_000_01", "0000 XXX - 000", "c.shp"));

    let report = ledger.save(&backend, false).unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].identifier, "5555_QQQ_555_01");
    assert_eq!(loaded(&backend).len(), 2);
}

#[test]
fn absent_stores_load_as_empty_ledgers() {
    let dir = tempfile::tempdir().unwrap();

    assert!(loaded(&CsvLedgerBackend::new(dir.path().join("none.csv"))).is_empty());
    assert!(loaded(&SqliteLedgerBackend::new(dir.path().join("none.db"))).is_empty());
}

#[test]
fn migrate_copies_file_store_into_database() {
    let dir = tempfile::tempdir().unwrap();
    let file = CsvLedgerBackend::new(dir.path().join("ledger.csv"));
    let database = seeded_database(&dir.path().join("ledger.db"));
    sample_ledger().save(&file, false).unwrap();

    let first = migrate(&file, &database, false).unwrap();
    assert_eq!(first.inserted, 2);

    let second = migrate(&file, &database, false).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(loaded(&database).len(), 2);
}

#[test]
fn load_after_mutation_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = CsvLedgerBackend::new(dir.path().join("ledger.csv"));

    let mut ledger = sample_ledger();
    assert!(ledger.load(&backend).is_err());
}
