//! Identifier allocation for new ledger entries.
//!
//! # Responsibility
//! - Derive `NORMALIZED_KEY_NN` identifiers from a natural key and the
//!   number of entries already recorded under it.
//!
//! # Invariants
//! - The result is never an identifier already present in the ledger.
//! - Identical key against an identical ledger snapshot yields the same id.
//! - Dropped entries are counted: their identifiers stay reserved.

use crate::ledger::{DroppedPolicy, Ledger};
use crate::model::entry::EntryId;
use crate::model::schema::Field;

/// Minimum digit count of the ordinal suffix.
pub const ORDINAL_WIDTH: usize = 2;

/// Allocates collision-free identifiers. Owned by the `Ledger`.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierAllocator {
    policy: DroppedPolicy,
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self {
            policy: DroppedPolicy::Include,
        }
    }
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next identifier for `natural_key`.
    ///
    /// The ordinal starts at `1 + count(natural_key)` and advances past any
    /// identifier that is already taken (gaps left by external edits).
    pub fn allocate(&self, natural_key: &str, ledger: &Ledger) -> EntryId {
        let base = normalize_natural_key(natural_key);
        let mut ordinal = ledger.count(Field::NaturalKey, natural_key, self.policy) + 1;
        loop {
            let candidate = format_identifier(&base, ordinal);
            if !ledger.contains(&candidate) {
                return candidate;
            }
            ordinal += 1;
        }
    }
}

/// Strips separator characters and upper-cases.
///
/// `"1234 abc - 001"` becomes `"1234_ABC_001"`.
pub fn normalize_natural_key(natural_key: &str) -> String {
    natural_key
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_' || c == '–')
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

pub fn format_identifier(normalized_key: &str, ordinal: usize) -> EntryId {
    format!("{normalized_key}_{ordinal:0width$}", width = ORDINAL_WIDTH)
}
