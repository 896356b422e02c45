//! In-memory authoritative ledger.
//!
//! # Responsibility
//! - Own the identifier -> entry map for one run.
//! - Load from and save to any `LedgerBackend`, diffing creates vs updates.
//! - Answer field-equality lookups used by allocation, duplicate detection
//!   and resume.
//!
//! # Invariants
//! - `load` must run before the first `add`/`set` of a process lifetime.
//! - Incremental saves never update an existing row unless `update` is set,
//!   and never insert a row that already exists.
//! - A failing row never aborts the remaining rows of a save.
//! - Dropped entries are hidden from `find`/`count` unless
//!   `DroppedPolicy::Include` is requested.

use crate::allocator::IdentifierAllocator;
use crate::backend::{BackendError, LedgerBackend};
use crate::model::entry::{now_epoch_ms, Entry, EntryId, EntryPatch};
use crate::model::schema::{Field, FieldValue};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug)]
pub enum LedgerError {
    NotFound(EntryId),
    /// Entry is soft-dropped and cannot be superseded again.
    AlreadyDropped(EntryId),
    /// `load` was called after the ledger had been mutated.
    LoadAfterMutation,
    Backend(BackendError),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "ledger entry not found: {id}"),
            Self::AlreadyDropped(id) => write!(f, "ledger entry already dropped: {id}"),
            Self::LoadAfterMutation => {
                write!(f, "ledger must be loaded before entries are added or changed")
            }
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for LedgerError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

/// Visibility of soft-dropped entries in lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DroppedPolicy {
    #[default]
    Exclude,
    Include,
}

impl DroppedPolicy {
    fn admits(self, entry: &Entry) -> bool {
        match self {
            Self::Exclude => entry.is_active(),
            Self::Include => true,
        }
    }
}

/// Conjunction of field-equality constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    constraints: Vec<(Field, FieldValue)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.constraints.push((field, value.into()));
        self
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.constraints
            .iter()
            .all(|(field, value)| entry.value_of(*field) == *value)
    }
}

/// What an incremental save does with one in-memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Insert,
    Update,
    Skip,
}

/// Decides the persistence action for one row.
///
/// Existing rows are only rewritten on `update` saves, so non-resume runs
/// never clobber edits made to the store outside this process.
pub fn plan_row(exists_in_store: bool, update: bool) -> RowAction {
    match (exists_in_store, update) {
        (false, _) => RowAction::Insert,
        (true, true) => RowAction::Update,
        (true, false) => RowAction::Skip,
    }
}

/// One row that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub identifier: EntryId,
    pub message: String,
}

/// Outcome of `Ledger::save`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<RowFailure>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Identifier-keyed ledger of every tracked feature.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: BTreeMap<EntryId, Entry>,
    allocator: IdentifierAllocator,
    mutated: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Entries in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Next free identifier for `natural_key` against the current state.
    pub fn allocate_identifier(&self, natural_key: &str) -> EntryId {
        self.allocator.allocate(natural_key, self)
    }

    /// Inserts or overwrites an entry. The caller guarantees freshness.
    pub fn add(&mut self, entry: Entry) {
        self.mutated = true;
        self.entries.insert(entry.identifier.clone(), entry);
    }

    /// Merges the `Some` fields of `patch` into an existing entry.
    pub fn set(&mut self, identifier: &str, patch: &EntryPatch) -> LedgerResult<()> {
        let entry = self
            .entries
            .get_mut(identifier)
            .ok_or_else(|| LedgerError::NotFound(identifier.to_string()))?;
        patch.apply_to(entry);
        self.mutated = true;
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> LedgerResult<&Entry> {
        self.entries
            .get(identifier)
            .ok_or_else(|| LedgerError::NotFound(identifier.to_string()))
    }

    /// First entry, in identifier order, satisfying every constraint.
    pub fn find(&self, criteria: &Criteria, policy: DroppedPolicy) -> Option<(&str, &Entry)> {
        self.entries
            .iter()
            .find(|(_, entry)| policy.admits(entry) && criteria.matches(entry))
            .map(|(identifier, entry)| (identifier.as_str(), entry))
    }

    /// Every entry satisfying every constraint, in identifier order.
    pub fn find_all(&self, criteria: &Criteria, policy: DroppedPolicy) -> Vec<&Entry> {
        self.entries
            .values()
            .filter(|entry| policy.admits(entry) && criteria.matches(entry))
            .collect()
    }

    pub fn count(&self, field: Field, value: impl Into<FieldValue>, policy: DroppedPolicy) -> usize {
        let value = value.into();
        self.entries
            .values()
            .filter(|entry| policy.admits(entry) && entry.value_of(field) == value)
            .count()
    }

    /// Supersedes `identifier` with a fresh entry under `new_natural_key`.
    ///
    /// Provenance is copied forward, the old entry is soft-dropped, and the
    /// new identifier is returned.
    pub fn rekey(&mut self, identifier: &str, new_natural_key: &str) -> LedgerResult<EntryId> {
        let previous = self.get(identifier)?;
        if !previous.is_active() {
            return Err(LedgerError::AlreadyDropped(identifier.to_string()));
        }

        let mut replacement = previous.clone();
        let new_identifier = self.allocate_identifier(new_natural_key);
        replacement.identifier = new_identifier.clone();
        replacement.natural_key = new_natural_key.to_string();
        replacement.created_at = now_epoch_ms();

        self.set(
            identifier,
            &EntryPatch {
                dropped: Some(true),
                ..EntryPatch::default()
            },
        )?;
        self.add(replacement);

        info!(
            "event=ledger_rekey module=ledger status=ok id={} superseded={} natural_key={}",
            new_identifier, identifier, new_natural_key
        );
        Ok(new_identifier)
    }

    /// Populates the map from `backend`.
    ///
    /// An absent store yields an empty ledger.
    pub fn load(&mut self, backend: &dyn LedgerBackend) -> LedgerResult<usize> {
        if self.mutated {
            return Err(LedgerError::LoadAfterMutation);
        }

        let started_at = Instant::now();
        info!(
            "event=ledger_load module=ledger status=start backend={} location={}",
            backend.kind(),
            backend.location()
        );

        let rows = match backend.load() {
            Ok(rows) => rows,
            Err(err) => {
                error!(
                    "event=ledger_load module=ledger status=error backend={} duration_ms={} error={}",
                    backend.kind(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        let loaded = rows.len();
        for entry in rows {
            if let Some(previous) = self.entries.insert(entry.identifier.clone(), entry) {
                warn!(
                    "event=ledger_load module=ledger status=warn id={} reason=duplicate_identifier_in_store",
                    previous.identifier
                );
            }
        }
        self.warn_duplicate_lineage();

        info!(
            "event=ledger_load module=ledger status=ok backend={} entries={} duration_ms={}",
            backend.kind(),
            loaded,
            started_at.elapsed().as_millis()
        );
        Ok(loaded)
    }

    /// Persists every entry to `backend`.
    ///
    /// Session-level failures (connect, listing, commit) are returned;
    /// per-row failures are logged and collected in the report.
    pub fn save(&self, backend: &dyn LedgerBackend, update: bool) -> LedgerResult<SaveReport> {
        let started_at = Instant::now();
        info!(
            "event=ledger_save module=ledger status=start backend={} location={} update={} entries={}",
            backend.kind(),
            backend.location(),
            update,
            self.entries.len()
        );

        let mut session = backend.connect()?;
        let existing = session.list_existing_identifiers()?;
        let mut report = SaveReport::default();

        for (identifier, entry) in &self.entries {
            let action = plan_row(existing.contains(identifier), update);
            let outcome = match action {
                RowAction::Insert => session.create(entry),
                RowAction::Update => {
                    session.update(identifier, &EntryPatch::mutable_snapshot(entry))
                }
                RowAction::Skip => {
                    report.skipped += 1;
                    continue;
                }
            };

            match outcome {
                Ok(()) if action == RowAction::Insert => report.inserted += 1,
                Ok(()) => report.updated += 1,
                Err(err) => {
                    error!(
                        "event=ledger_save_row module=ledger status=error id={} action={:?} error={}",
                        identifier, action, err
                    );
                    report.failures.push(RowFailure {
                        identifier: identifier.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        session.commit()?;

        info!(
            "event=ledger_save module=ledger status={} backend={} inserted={} updated={} skipped={} failed={} duration_ms={}",
            if report.is_clean() { "ok" } else { "warn" },
            backend.kind(),
            report.inserted,
            report.updated,
            report.skipped,
            report.failures.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn warn_duplicate_lineage(&self) {
        let mut seen: BTreeMap<(&str, &str), &str> = BTreeMap::new();
        for entry in self.entries.values().filter(|entry| entry.is_active()) {
            let key = (
                entry.absolute_source_path.as_str(),
                entry.raw_relative_path.as_str(),
            );
            if let Some(first) = seen.insert(key, entry.identifier.as_str()) {
                warn!(
                    "event=ledger_lineage module=ledger status=warn id={} duplicate_of={} raw_path={}",
                    entry.identifier, first, entry.raw_relative_path
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_row, Criteria, DroppedPolicy, Ledger, LedgerError, RowAction};
    use crate::model::entry::{Entry, EntryPatch, EntryType};
    use crate::model::schema::Field;

    fn entry(identifier: &str, natural_key: &str, raw: &str) -> Entry {
        let mut entry = Entry::new(identifier, natural_key, EntryType::Spatial);
        entry.raw_relative_path = raw.to_string();
        entry.absolute_source_path = format!("/data/{raw}");
        entry
    }

    #[test]
    fn set_merges_fields_and_rejects_unknown_identifiers() {
        let mut ledger = Ledger::new();
        ledger.add(entry("1234_ABC_001_01", "1234 ABC - 001", "a.shp"));

        ledger
            .set(
                "1234_ABC_001_01",
                &EntryPatch {
                    processed: Some(true),
                    ..EntryPatch::default()
                },
            )
            .unwrap();
        assert!(ledger.get("1234_ABC_001_01").unwrap().processed);

        let err = ledger.set("missing", &EntryPatch::default()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn find_returns_first_match_and_hides_dropped_by_default() {
        let mut ledger = Ledger::new();
        let mut dropped = entry("1234_ABC_001_01", "1234 ABC - 001", "same.shp");
        dropped.soft_drop();
        ledger.add(dropped);
        ledger.add(entry("1234_ABC_001_02", "1234 ABC - 001", "same.shp"));

        let criteria = Criteria::new().with(Field::RawRelativePath, "same.shp");
        let (identifier, _) = ledger.find(&criteria, DroppedPolicy::Exclude).unwrap();
        assert_eq!(identifier, "1234_ABC_001_02");

        let (identifier, _) = ledger.find(&criteria, DroppedPolicy::Include).unwrap();
        assert_eq!(identifier, "1234_ABC_001_01");

        let none = Criteria::new().with(Field::RawRelativePath, "other.shp");
        assert!(ledger.find(&none, DroppedPolicy::Include).is_none());
    }

    #[test]
    fn count_honours_dropped_policy() {
        let mut ledger = Ledger::new();
        let mut dropped = entry("1234_ABC_001_01", "1234 ABC - 001", "a.shp");
        dropped.soft_drop();
        ledger.add(dropped);
        ledger.add(entry("1234_ABC_001_02", "1234 ABC - 001", "b.shp"));

        assert_eq!(
            ledger.count(Field::NaturalKey, "1234 ABC - 001", DroppedPolicy::Exclude),
            1
        );
        assert_eq!(
            ledger.count(Field::NaturalKey, "1234 ABC - 001", DroppedPolicy::Include),
            2
        );
    }

    #[test]
    fn plan_row_covers_every_combination() {
        assert_eq!(plan_row(false, false), RowAction::Insert);
        assert_eq!(plan_row(false, true), RowAction::Insert);
        assert_eq!(plan_row(true, true), RowAction::Update);
        assert_eq!(plan_row(true, false), RowAction::Skip);
    }

    #[test]
    fn rekey_drops_old_entry_and_allocates_under_new_key() {
        let mut ledger = Ledger::new();
        ledger.add(entry("0000_XXX_000_01", "0000 XXX - 000", "unknown/a.shp"));

        let new_id = ledger.rekey("0000_XXX_000_01", "1234 ABC - 001").unwrap();

        assert_eq!(new_id, "1234_ABC_001_01");
        assert!(ledger.get("0000_XXX_000_01").unwrap().dropped);
        let replacement = ledger.get(&new_id).unwrap();
        assert_eq!(replacement.raw_relative_path, "unknown/a.shp");
        assert!(!replacement.dropped);

        let err = ledger.rekey("0000_XXX_000_01", "1234 ABC - 001").unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyDropped(_)));
    }
}
