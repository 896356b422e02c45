//! Checkpoint-on-failure for fatal dispatch errors.
//!
//! # Responsibility
//! - Persist the in-memory ledger when a run aborts, so the next run can
//!   resume from the point of failure.
//!
//! # Invariants
//! - Fires at most once per handler.
//! - Saves with `update` equal to the run's resume flag.
//! - Panics inside a guarded body are treated like fatal errors.

use crate::backend::LedgerBackend;
use crate::ledger::{Ledger, SaveReport};
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// A guarded body failed and the run must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aborted {
    pub reason: String,
    /// Checkpoint save report, `None` when the checkpoint itself failed or
    /// had already fired.
    pub checkpoint: Option<SaveReport>,
}

impl Aborted {
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

impl Display for Aborted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "run aborted: {}", self.reason)
    }
}

impl Error for Aborted {}

pub struct CheckpointHandler<'a> {
    backend: &'a dyn LedgerBackend,
    update: bool,
    fired: bool,
}

impl<'a> CheckpointHandler<'a> {
    pub fn new(backend: &'a dyn LedgerBackend, update: bool) -> Self {
        Self {
            backend,
            update,
            fired: false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Runs `body` against the ledger, checkpointing if it fails or panics.
    pub fn guard<T, E, F>(&mut self, ledger: &mut Ledger, body: F) -> Result<T, Aborted>
    where
        E: Display,
        F: FnOnce(&mut Ledger) -> Result<T, E>,
    {
        let reason = match catch_unwind(AssertUnwindSafe(|| body(&mut *ledger))) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_reason(payload.as_ref()),
        };

        let checkpoint = self.fire(ledger, &reason);
        Err(Aborted { reason, checkpoint })
    }

    /// Saves the ledger once. Later calls are no-ops.
    pub fn fire(&mut self, ledger: &Ledger, reason: &str) -> Option<SaveReport> {
        if self.fired {
            return None;
        }
        self.fired = true;

        match ledger.save(self.backend, self.update) {
            Ok(report) => {
                error!(
                    "event=checkpoint module=checkpoint status=error backend={} saved={} failed_rows={} reason={} message=\"checkpoint made at point of failure\"",
                    self.backend.kind(),
                    report.inserted + report.updated,
                    report.failures.len(),
                    reason
                );
                Some(report)
            }
            Err(err) => {
                error!(
                    "event=checkpoint module=checkpoint status=error backend={} reason={} error={} message=\"checkpoint save failed\"",
                    self.backend.kind(),
                    reason,
                    err
                );
                None
            }
        }
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic: non-string payload".to_string()
    }
}
