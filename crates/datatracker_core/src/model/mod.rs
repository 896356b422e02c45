//! Ledger domain model.
//!
//! # Responsibility
//! - Define the entry row and its partial-update shape.
//! - Describe the fixed persisted schema as data.
//!
//! # Invariants
//! - Every entry is identified by a stable, never-reused `EntryId`.
//! - Deletion is represented by the `dropped` marker, not row removal.

pub mod entry;
pub mod schema;
