//! Flat-file (CSV) ledger backend.
//!
//! # Responsibility
//! - Persist the whole ledger as one CSV table, one row per entry.
//! - Replace the store atomically on save.
//!
//! # Invariants
//! - Header order follows `LEDGER_COLUMNS`, `identifier` first.
//! - Booleans are written as `true`/`false` and read back as booleans.
//! - A failed save leaves the previous store untouched (temp file + rename).
//! - A save session starts from an empty table, so every in-memory entry
//!   is written as a fresh row.

use crate::backend::{BackendError, BackendKind, BackendResult, BackendSession, LedgerBackend};
use crate::model::entry::{Entry, EntryId, EntryPatch};
use crate::model::schema::column_names;
use log::info;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// CSV-backed ledger store.
#[derive(Debug, Clone)]
pub struct CsvLedgerBackend {
    path: PathBuf,
}

impl CsvLedgerBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerBackend for CsvLedgerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> BackendResult<Vec<Entry>> {
        if !self.path.exists() {
            info!(
                "event=ledger_file_load module=backend status=ok reason=store_absent path={}",
                self.path.display()
            );
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let mut entries = Vec::new();
        for (index, row) in reader.deserialize::<Entry>().enumerate() {
            let entry = row.map_err(|err| {
                BackendError::InvalidData(format!(
                    "row {} of `{}`: {err}",
                    index + 1,
                    self.path.display()
                ))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn connect(&self) -> BackendResult<Box<dyn BackendSession + '_>> {
        Ok(Box::new(CsvSession {
            path: self.path.as_path(),
            rows: BTreeMap::new(),
        }))
    }
}

struct CsvSession<'a> {
    path: &'a Path,
    rows: BTreeMap<EntryId, Entry>,
}

impl BackendSession for CsvSession<'_> {
    fn list_existing_identifiers(&mut self) -> BackendResult<BTreeSet<EntryId>> {
        Ok(self.rows.keys().cloned().collect())
    }

    fn create(&mut self, entry: &Entry) -> BackendResult<()> {
        self.rows.insert(entry.identifier.clone(), entry.clone());
        Ok(())
    }

    fn update(&mut self, identifier: &str, patch: &EntryPatch) -> BackendResult<()> {
        let row = self
            .rows
            .get_mut(identifier)
            .ok_or_else(|| BackendError::NotFound(identifier.to_string()))?;
        patch.apply_to(row);
        Ok(())
    }

    fn commit(self: Box<Self>) -> BackendResult<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&directory)?;

        let staged = NamedTempFile::new_in(&directory)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(staged.as_file());
            writer.write_record(column_names())?;
            for entry in self.rows.values() {
                writer.serialize(entry)?;
            }
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        staged
            .persist(self.path)
            .map_err(|err| BackendError::Io(err.error))?;

        info!(
            "event=ledger_file_save module=backend status=ok rows={} path={}",
            self.rows.len(),
            self.path.display()
        );
        Ok(())
    }
}
