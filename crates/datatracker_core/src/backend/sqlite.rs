//! Relational (SQLite) ledger backend.
//!
//! # Responsibility
//! - Persist entries as rows of `ledger_entries`, keyed by `identifier`.
//! - Expose the `natural_keys` registry table that rows reference.
//!
//! # Invariants
//! - Every `load` and every save session opens its own connection and
//!   closes it when done; there is no pooling and no run-wide transaction.
//! - `natural_key` is a foreign key: inserting an unknown key fails for
//!   that row only.
//! - Column lists are derived from `LEDGER_COLUMNS`.

use crate::backend::{BackendError, BackendKind, BackendResult, BackendSession, LedgerBackend};
use crate::db::{open_db, DbError};
use crate::model::entry::{Entry, EntryId, EntryPatch, EntryType};
use crate::model::schema::{FieldValue, LEDGER_COLUMNS};
use crate::registry::Registry;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const LEDGER_TABLE: &str = "ledger_entries";

/// SQLite-backed ledger store.
#[derive(Debug, Clone)]
pub struct SqliteLedgerBackend {
    path: PathBuf,
}

impl SqliteLedgerBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the natural-key registry table in insertion order.
    pub fn load_registry(&self) -> BackendResult<Registry> {
        let conn = open_db(&self.path)?;
        let keys = {
            let mut stmt = conn.prepare("SELECT natural_key FROM natural_keys ORDER BY rowid;")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        close(conn)?;
        Ok(Registry::new(keys))
    }

    /// Inserts registry keys that are not present yet. Returns the number
    /// of new keys.
    pub fn seed_registry(&self, registry: &Registry) -> BackendResult<usize> {
        let mut conn = open_db(&self.path)?;
        let mut inserted = 0;
        {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT OR IGNORE INTO natural_keys (natural_key) VALUES (?1);")?;
                for key in registry.keys() {
                    inserted += stmt.execute(params![key])?;
                }
            }
            tx.commit()?;
        }
        close(conn)?;

        info!(
            "event=registry_seed module=backend status=ok inserted={} total={}",
            inserted,
            registry.len()
        );
        Ok(inserted)
    }
}

impl LedgerBackend for SqliteLedgerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> BackendResult<Vec<Entry>> {
        let conn = open_db(&self.path)?;
        let entries = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {LEDGER_TABLE} ORDER BY identifier ASC;",
                column_list()
            ))?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(parse_entry_row(row)?);
            }
            entries
        };
        close(conn)?;
        Ok(entries)
    }

    fn connect(&self) -> BackendResult<Box<dyn BackendSession + '_>> {
        let conn = open_db(&self.path)?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: Connection,
}

impl BackendSession for SqliteSession {
    fn list_existing_identifiers(&mut self) -> BackendResult<BTreeSet<EntryId>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT identifier FROM {LEDGER_TABLE};"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<BTreeSet<_>, _>>()?)
    }

    fn create(&mut self, entry: &Entry) -> BackendResult<()> {
        let placeholders = (1..=LEDGER_COLUMNS.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let values = entry.column_values().into_iter().map(to_sql_value);

        self.conn.execute(
            &format!(
                "INSERT INTO {LEDGER_TABLE} ({}) VALUES ({placeholders});",
                column_list()
            ),
            params_from_iter(values),
        )?;
        Ok(())
    }

    fn update(&mut self, identifier: &str, patch: &EntryPatch) -> BackendResult<()> {
        let changed = patch.changed_values();
        if changed.is_empty() {
            return Ok(());
        }

        let assignments = changed
            .iter()
            .enumerate()
            .map(|(index, (field, _))| format!("{} = ?{}", field.name(), index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut values: Vec<Value> = changed
            .into_iter()
            .map(|(_, value)| to_sql_value(value))
            .collect();
        values.push(Value::Text(identifier.to_string()));
        let identifier_slot = values.len();

        let updated = self.conn.execute(
            &format!(
                "UPDATE {LEDGER_TABLE} SET {assignments} WHERE identifier = ?{identifier_slot};"
            ),
            params_from_iter(values),
        )?;
        if updated == 0 {
            return Err(BackendError::NotFound(identifier.to_string()));
        }
        Ok(())
    }

    fn commit(self: Box<Self>) -> BackendResult<()> {
        close(self.conn)
    }
}

fn close(conn: Connection) -> BackendResult<()> {
    conn.close()
        .map_err(|(_, err)| BackendError::Db(DbError::Sqlite(err)))
}

fn column_list() -> String {
    LEDGER_COLUMNS
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql_value(value: FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => Value::Text(text),
        FieldValue::Bool(flag) => Value::Integer(i64::from(flag)),
        FieldValue::Int(number) => Value::Integer(number),
        FieldValue::Null => Value::Null,
    }
}

fn parse_entry_row(row: &Row<'_>) -> BackendResult<Entry> {
    let identifier: String = row.get("identifier")?;
    let type_text: String = row.get("entry_type")?;
    let entry_type = EntryType::parse(&type_text).ok_or_else(|| {
        BackendError::InvalidData(format!(
            "invalid entry type `{type_text}` for `{identifier}` in {LEDGER_TABLE}.entry_type"
        ))
    })?;

    Ok(Entry {
        natural_key: row.get("natural_key")?,
        dropped: parse_flag(row, "dropped", &identifier)?,
        raw_relative_path: row.get("raw_relative_path")?,
        raw_container_path: row.get("raw_container_path")?,
        absolute_source_path: row.get("absolute_source_path")?,
        in_output_store: parse_flag(row, "in_output_store", &identifier)?,
        contains_pdf: parse_flag(row, "contains_pdf", &identifier)?,
        contains_image: parse_flag(row, "contains_image", &identifier)?,
        extracted_attachments_path: row.get("extracted_attachments_path")?,
        tracking_enabled: parse_flag(row, "tracking_enabled", &identifier)?,
        processed: parse_flag(row, "processed", &identifier)?,
        entry_type,
        created_at: row.get("created_at")?,
        identifier,
    })
}

fn parse_flag(row: &Row<'_>, column: &str, identifier: &str) -> BackendResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(BackendError::InvalidData(format!(
            "invalid {column} value `{other}` for `{identifier}` in {LEDGER_TABLE}.{column}"
        ))),
    }
}
