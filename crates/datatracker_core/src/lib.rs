//! Core of the datatracker ingestion ledger.
//! This crate is the single source of truth for identifier allocation,
//! ledger persistence and dispatch invariants.

pub mod allocator;
pub mod backend;
pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod context;
pub mod db;
pub mod discovery;
pub mod dispatch;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod registry;

pub use allocator::{normalize_natural_key, IdentifierAllocator};
pub use backend::{
    BackendError, BackendKind, BackendResult, BackendSession, CsvLedgerBackend, LedgerBackend,
    SqliteLedgerBackend,
};
pub use checkpoint::{Aborted, CheckpointHandler, EXIT_FAILURE, EXIT_SUCCESS};
pub use collab::{
    AttachmentExtractor, ContainerInspector, ContainerKind, ConvertError, ConvertResult,
    Converter, SourceRef,
};
pub use config::{backend_for, ConfigError, RunConfig};
pub use context::RunContext;
pub use dispatch::{
    Collaborators, DispatchError, DispatchSettings, DispatchSummary, Dispatcher,
};
pub use ledger::{Criteria, DroppedPolicy, Ledger, LedgerError, LedgerResult, SaveReport};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entry::{Entry, EntryId, EntryPatch, EntryType};
pub use model::schema::{Field, FieldValue};
pub use pipeline::{migrate, run_ingestion, RunError, RunReport};
pub use registry::{Registry, RegistryError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
