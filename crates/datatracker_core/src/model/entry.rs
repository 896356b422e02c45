//! Ledger entry domain model.
//!
//! # Responsibility
//! - Define the canonical row tracked for every extracted feature.
//! - Provide partial-update semantics (`EntryPatch`) used by `Ledger::set`.
//!
//! # Invariants
//! - `identifier` is assigned once and never rewritten.
//! - `dropped` is the source of truth for soft-delete state; rows are never
//!   physically removed.
//! - Field declaration order is the persisted column order.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Ledger identifier, e.g. `1234_ABC_001_02`.
pub type EntryId = String;

/// Whether an entry produces a canonical output feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Geometry-bearing input converted into the output store.
    Spatial,
    /// Recorded for lineage only (layouts, data sheets, images, PDFs).
    Aspatial,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spatial => "Spatial",
            Self::Aspatial => "Aspatial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Spatial" => Some(Self::Spatial),
            "Aspatial" => Some(Self::Aspatial),
            _ => None,
        }
    }
}

/// One ledger row: a single canonical feature and its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub identifier: EntryId,
    /// Grouping key the identifier is derived from.
    pub natural_key: String,
    pub dropped: bool,
    /// Feature path relative to the ingestion root, `/`-separated.
    pub raw_relative_path: String,
    /// Relative path of the discovered input that produced this feature.
    pub raw_container_path: String,
    /// Canonical absolute path of the discovered input.
    pub absolute_source_path: String,
    pub in_output_store: bool,
    pub contains_pdf: bool,
    pub contains_image: bool,
    pub extracted_attachments_path: Option<String>,
    pub tracking_enabled: bool,
    pub processed: bool,
    pub entry_type: EntryType,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Entry {
    /// Creates an unprocessed, non-dropped entry stamped with the current time.
    ///
    /// Path fields start empty; callers fill them before `Ledger::add`.
    pub fn new(
        identifier: impl Into<EntryId>,
        natural_key: impl Into<String>,
        entry_type: EntryType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            natural_key: natural_key.into(),
            dropped: false,
            raw_relative_path: String::new(),
            raw_container_path: String::new(),
            absolute_source_path: String::new(),
            in_output_store: false,
            contains_pdf: false,
            contains_image: false,
            extracted_attachments_path: None,
            tracking_enabled: false,
            processed: false,
            entry_type,
            created_at: now_epoch_ms(),
        }
    }

    /// Returns whether this entry participates in default lookups.
    pub fn is_active(&self) -> bool {
        !self.dropped
    }

    /// Marks this entry as superseded.
    pub fn soft_drop(&mut self) {
        self.dropped = true;
    }
}

/// Partial update applied by `Ledger::set`.
///
/// `None` means "leave unchanged"; there is no way to clear a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub natural_key: Option<String>,
    pub dropped: Option<bool>,
    pub raw_relative_path: Option<String>,
    pub raw_container_path: Option<String>,
    pub absolute_source_path: Option<String>,
    pub in_output_store: Option<bool>,
    pub contains_pdf: Option<bool>,
    pub contains_image: Option<bool>,
    pub extracted_attachments_path: Option<String>,
    pub tracking_enabled: Option<bool>,
    pub processed: Option<bool>,
}

impl EntryPatch {
    /// Patch carrying every mutable field of `entry`.
    ///
    /// Used by incremental saves: provenance columns are never rewritten
    /// once a row exists in the store.
    pub fn mutable_snapshot(entry: &Entry) -> Self {
        Self {
            dropped: Some(entry.dropped),
            in_output_store: Some(entry.in_output_store),
            contains_pdf: Some(entry.contains_pdf),
            contains_image: Some(entry.contains_image),
            extracted_attachments_path: entry.extracted_attachments_path.clone(),
            tracking_enabled: Some(entry.tracking_enabled),
            processed: Some(entry.processed),
            ..Self::default()
        }
    }

    /// Merges every `Some` field into `entry`.
    pub fn apply_to(&self, entry: &mut Entry) {
        if let Some(value) = &self.natural_key {
            entry.natural_key = value.clone();
        }
        if let Some(value) = self.dropped {
            entry.dropped = value;
        }
        if let Some(value) = &self.raw_relative_path {
            entry.raw_relative_path = value.clone();
        }
        if let Some(value) = &self.raw_container_path {
            entry.raw_container_path = value.clone();
        }
        if let Some(value) = &self.absolute_source_path {
            entry.absolute_source_path = value.clone();
        }
        if let Some(value) = self.in_output_store {
            entry.in_output_store = value;
        }
        if let Some(value) = self.contains_pdf {
            entry.contains_pdf = value;
        }
        if let Some(value) = self.contains_image {
            entry.contains_image = value;
        }
        if let Some(value) = &self.extracted_attachments_path {
            entry.extracted_attachments_path = Some(value.clone());
        }
        if let Some(value) = self.tracking_enabled {
            entry.tracking_enabled = value;
        }
        if let Some(value) = self.processed {
            entry.processed = value;
        }
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
