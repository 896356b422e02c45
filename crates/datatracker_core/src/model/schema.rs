//! Fixed ledger schema described as data.
//!
//! # Responsibility
//! - Name every persisted column and whether it is mutable.
//! - Provide the field/value vocabulary used by ledger queries.
//!
//! # Invariants
//! - `LEDGER_COLUMNS` order equals `Entry` field order, `identifier` first.
//! - Only mutable columns are rewritten by incremental saves.

use crate::model::entry::{Entry, EntryPatch, EntryType};

/// Addressable ledger field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Identifier,
    NaturalKey,
    Dropped,
    RawRelativePath,
    RawContainerPath,
    AbsoluteSourcePath,
    InOutputStore,
    ContainsPdf,
    ContainsImage,
    ExtractedAttachmentsPath,
    TrackingEnabled,
    Processed,
    EntryType,
    CreatedAt,
}

/// One persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub field: Field,
    pub name: &'static str,
    pub mutable: bool,
}

const fn column(field: Field, name: &'static str, mutable: bool) -> Column {
    Column {
        field,
        name,
        mutable,
    }
}

pub const LEDGER_COLUMNS: &[Column] = &[
    column(Field::Identifier, "identifier", false),
    column(Field::NaturalKey, "natural_key", false),
    column(Field::Dropped, "dropped", true),
    column(Field::RawRelativePath, "raw_relative_path", false),
    column(Field::RawContainerPath, "raw_container_path", false),
    column(Field::AbsoluteSourcePath, "absolute_source_path", false),
    column(Field::InOutputStore, "in_output_store", true),
    column(Field::ContainsPdf, "contains_pdf", true),
    column(Field::ContainsImage, "contains_image", true),
    column(Field::ExtractedAttachmentsPath, "extracted_attachments_path", true),
    column(Field::TrackingEnabled, "tracking_enabled", true),
    column(Field::Processed, "processed", true),
    column(Field::EntryType, "entry_type", false),
    column(Field::CreatedAt, "created_at", false),
];

impl Field {
    pub fn column(self) -> &'static Column {
        LEDGER_COLUMNS
            .iter()
            .find(|column| column.field == self)
            .unwrap_or(&LEDGER_COLUMNS[0])
    }

    pub fn name(self) -> &'static str {
        self.column().name
    }
}

/// Column names in persisted order.
pub fn column_names() -> Vec<&'static str> {
    LEDGER_COLUMNS.iter().map(|column| column.name).collect()
}

/// Comparable field value used by `find`/`count` and SQL binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Null,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

impl From<EntryType> for FieldValue {
    fn from(value: EntryType) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl Entry {
    /// Reads one field as a comparable value.
    pub fn value_of(&self, field: Field) -> FieldValue {
        match field {
            Field::Identifier => FieldValue::from(&self.identifier),
            Field::NaturalKey => FieldValue::from(&self.natural_key),
            Field::Dropped => FieldValue::Bool(self.dropped),
            Field::RawRelativePath => FieldValue::from(&self.raw_relative_path),
            Field::RawContainerPath => FieldValue::from(&self.raw_container_path),
            Field::AbsoluteSourcePath => FieldValue::from(&self.absolute_source_path),
            Field::InOutputStore => FieldValue::Bool(self.in_output_store),
            Field::ContainsPdf => FieldValue::Bool(self.contains_pdf),
            Field::ContainsImage => FieldValue::Bool(self.contains_image),
            Field::ExtractedAttachmentsPath => {
                FieldValue::from(self.extracted_attachments_path.clone())
            }
            Field::TrackingEnabled => FieldValue::Bool(self.tracking_enabled),
            Field::Processed => FieldValue::Bool(self.processed),
            Field::EntryType => FieldValue::from(self.entry_type),
            Field::CreatedAt => FieldValue::Int(self.created_at),
        }
    }

    /// Values of every column, in persisted order.
    pub fn column_values(&self) -> Vec<FieldValue> {
        LEDGER_COLUMNS
            .iter()
            .map(|column| self.value_of(column.field))
            .collect()
    }
}

impl EntryPatch {
    /// Present fields as `(field, value)` pairs, in column order.
    pub fn changed_values(&self) -> Vec<(Field, FieldValue)> {
        let candidates = [
            (Field::NaturalKey, self.natural_key.clone().map(FieldValue::Text)),
            (Field::Dropped, self.dropped.map(FieldValue::Bool)),
            (
                Field::RawRelativePath,
                self.raw_relative_path.clone().map(FieldValue::Text),
            ),
            (
                Field::RawContainerPath,
                self.raw_container_path.clone().map(FieldValue::Text),
            ),
            (
                Field::AbsoluteSourcePath,
                self.absolute_source_path.clone().map(FieldValue::Text),
            ),
            (Field::InOutputStore, self.in_output_store.map(FieldValue::Bool)),
            (Field::ContainsPdf, self.contains_pdf.map(FieldValue::Bool)),
            (Field::ContainsImage, self.contains_image.map(FieldValue::Bool)),
            (
                Field::ExtractedAttachmentsPath,
                self.extracted_attachments_path.clone().map(FieldValue::Text),
            ),
            (Field::TrackingEnabled, self.tracking_enabled.map(FieldValue::Bool)),
            (Field::Processed, self.processed.map(FieldValue::Bool)),
        ];

        candidates
            .into_iter()
            .filter_map(|(field, value)| value.map(|value| (field, value)))
            .collect()
    }
}
