//! Resume decisions for inputs already recorded by an earlier run.
//!
//! # Invariants
//! - Without resume mode every input is dispatched fresh.
//! - An input is skipped only when it has at least one non-dropped entry
//!   and every such entry is processed.
//! - A partially recorded input keeps its entries; matching is by
//!   canonical source path plus raw relative path.

use crate::ledger::{Criteria, DroppedPolicy, Ledger};
use crate::model::entry::Entry;
use crate::model::schema::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Nothing recorded for this input (or not resuming).
    Fresh,
    /// Every recorded entry is processed.
    Skip,
    /// Some entries exist but at least one is unprocessed.
    Continue,
}

#[derive(Debug, Clone, Copy)]
pub struct ResumeController {
    enabled: bool,
}

impl ResumeController {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn decide(&self, ledger: &Ledger, absolute_source_path: &str) -> ResumeDecision {
        if !self.enabled {
            return ResumeDecision::Fresh;
        }

        let criteria = Criteria::new().with(Field::AbsoluteSourcePath, absolute_source_path);
        let recorded = ledger.find_all(&criteria, DroppedPolicy::Exclude);
        if recorded.is_empty() {
            ResumeDecision::Fresh
        } else if recorded.iter().all(|entry| entry.processed) {
            ResumeDecision::Skip
        } else {
            ResumeDecision::Continue
        }
    }

    /// Entry recorded earlier for one feature of a partially processed input.
    pub fn recorded_entry<'a>(
        &self,
        ledger: &'a Ledger,
        absolute_source_path: &str,
        raw_relative_path: &str,
    ) -> Option<&'a Entry> {
        let criteria = Criteria::new()
            .with(Field::AbsoluteSourcePath, absolute_source_path)
            .with(Field::RawRelativePath, raw_relative_path);
        ledger
            .find(&criteria, DroppedPolicy::Exclude)
            .map(|(_, entry)| entry)
    }
}
