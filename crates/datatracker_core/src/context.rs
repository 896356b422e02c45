//! Per-run execution context passed explicitly through dispatch.

use uuid::Uuid;

/// Flags and identity of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    /// Correlates every log line of one run.
    pub run_id: Uuid,
    /// Skip inputs already fully recorded, and save with row updates.
    pub resume: bool,
    /// Emit per-entry debug lines.
    pub debug: bool,
}

impl RunContext {
    pub fn new(resume: bool, debug: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            resume,
            debug,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(false, false)
    }
}
