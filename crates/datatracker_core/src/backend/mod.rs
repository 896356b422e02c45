//! Durable persistence backends for the ledger.
//!
//! # Responsibility
//! - Define the storage contract shared by the file and relational stores.
//! - Keep storage-format details out of the in-memory ledger.
//!
//! # Invariants
//! - An absent or empty store loads as an empty entry set.
//! - One `BackendSession` spans exactly one save call; it is opened by
//!   `connect` and closed by `commit`.
//! - Rows are never deleted through this contract.

use crate::db::DbError;
use crate::model::entry::{Entry, EntryId, EntryPatch};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod file;
pub mod sqlite;

pub use file::CsvLedgerBackend;
pub use sqlite::SqliteLedgerBackend;

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage mode, selectable independently for load and save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Flat CSV table, replaced wholesale on every save.
    File,
    /// SQLite table, diffed row by row.
    Relational,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Relational => "database",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "datatracker" | "csv" => Some(Self::File),
            "database" | "db" | "sqlite" => Some(Self::Relational),
            _ => None,
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence failure reported by a backend.
#[derive(Debug)]
pub enum BackendError {
    Io(std::io::Error),
    Csv(csv::Error),
    Db(DbError),
    /// `update` targeted an identifier absent from the store.
    NotFound(EntryId),
    /// Persisted row cannot be converted into a valid entry.
    InvalidData(String),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Csv(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "ledger row not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for BackendError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage contract used by `Ledger::load` and `Ledger::save`.
pub trait LedgerBackend {
    fn kind(&self) -> BackendKind;

    /// Human-readable store location for log lines.
    fn location(&self) -> String;

    /// Reads every persisted entry.
    fn load(&self) -> BackendResult<Vec<Entry>>;

    /// Opens a write session for one save call.
    fn connect(&self) -> BackendResult<Box<dyn BackendSession + '_>>;
}

/// Row-level write access for the duration of one save call.
pub trait BackendSession {
    /// Identifiers already present in the target of this session.
    fn list_existing_identifiers(&mut self) -> BackendResult<BTreeSet<EntryId>>;

    /// Inserts every column of `entry`.
    fn create(&mut self, entry: &Entry) -> BackendResult<()>;

    /// Rewrites the `Some` fields of `patch` on an existing row.
    fn update(&mut self, identifier: &str, patch: &EntryPatch) -> BackendResult<()>;

    /// Finishes the session and releases the underlying resource.
    fn commit(self: Box<Self>) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::BackendKind;

    #[test]
    fn backend_kind_accepts_legacy_aliases() {
        assert_eq!(BackendKind::parse("datatracker"), Some(BackendKind::File));
        assert_eq!(BackendKind::parse(" Database "), Some(BackendKind::Relational));
        assert_eq!(BackendKind::parse("excel"), None);
    }
}
