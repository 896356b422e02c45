//! End-to-end ingestion run: load, guarded dispatch, final save.
//!
//! # Invariants
//! - Loading happens before the first ledger mutation.
//! - A fatal dispatch error checkpoints to the save backend and stops;
//!   the final save only runs after a clean dispatch.
//! - Both saves use `update = resume`.

use crate::backend::LedgerBackend;
use crate::checkpoint::{Aborted, CheckpointHandler, EXIT_FAILURE, EXIT_SUCCESS};
use crate::context::RunContext;
use crate::dispatch::{DispatchSummary, Dispatcher};
use crate::ledger::{Ledger, LedgerError, SaveReport};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub loaded: usize,
    pub summary: DispatchSummary,
    pub save: SaveReport,
}

#[derive(Debug)]
pub enum RunError {
    /// The ledger could not be loaded; nothing was dispatched.
    Load(LedgerError),
    /// Dispatch failed and a checkpoint was attempted.
    Aborted(Aborted),
    /// Dispatch completed but the final save could not open or commit.
    Save(LedgerError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Aborted(aborted) => aborted.exit_code(),
            Self::Load(_) | Self::Save(_) => EXIT_FAILURE,
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "failed to load ledger: {err}"),
            Self::Aborted(err) => write!(f, "{err}"),
            Self::Save(err) => write!(f, "failed to save ledger: {err}"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) | Self::Save(err) => Some(err),
            Self::Aborted(err) => Some(err),
        }
    }
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        EXIT_SUCCESS
    }
}

/// Runs one ingestion against `ledger`.
///
/// `ledger` stays with the caller so it can be inspected after an abort.
pub fn run_ingestion(
    ledger: &mut Ledger,
    load_from: &dyn LedgerBackend,
    save_to: &dyn LedgerBackend,
    dispatcher: &mut Dispatcher<'_>,
    context: &RunContext,
) -> Result<RunReport, RunError> {
    info!(
        "event=run module=pipeline status=start run_id={} load={} save={} resume={}",
        context.run_id,
        load_from.kind(),
        save_to.kind(),
        context.resume
    );

    let loaded = ledger.load(load_from).map_err(RunError::Load)?;

    let mut checkpoint = CheckpointHandler::new(save_to, context.resume);
    let summary = checkpoint
        .guard(ledger, |ledger| dispatcher.run(ledger))
        .map_err(|aborted| {
            error!(
                "event=run module=pipeline status=error run_id={} reason={}",
                context.run_id, aborted.reason
            );
            RunError::Aborted(aborted)
        })?;

    let save = ledger
        .save(save_to, context.resume)
        .map_err(RunError::Save)?;

    info!(
        "event=run module=pipeline status=ok run_id={} loaded={} created={} converted={} failed={} saved={} failed_rows={}",
        context.run_id,
        loaded,
        summary.created,
        summary.converted,
        summary.failed,
        save.inserted + save.updated,
        save.failures.len()
    );
    Ok(RunReport {
        loaded,
        summary,
        save,
    })
}

/// Copies every entry from one backend into another.
///
/// Rows already present in the target are rewritten only when `update`
/// is set.
pub fn migrate(
    load_from: &dyn LedgerBackend,
    save_to: &dyn LedgerBackend,
    update: bool,
) -> Result<SaveReport, RunError> {
    let mut ledger = Ledger::new();
    let loaded = ledger.load(load_from).map_err(RunError::Load)?;
    let report = ledger.save(save_to, update).map_err(RunError::Save)?;
    info!(
        "event=migrate module=pipeline status=ok from={} to={} loaded={} inserted={} updated={} failed_rows={}",
        load_from.kind(),
        save_to.kind(),
        loaded,
        report.inserted,
        report.updated,
        report.failures.len()
    );
    Ok(report)
}
