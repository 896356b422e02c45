//! Run configuration and fail-fast validation.
//!
//! # Responsibility
//! - Hold every path and flag an ingestion run needs.
//! - Reject unusable configurations before anything is loaded.
//!
//! # Invariants
//! - `validate` touches the filesystem read-only.
//! - A backend is only constructed for a kind whose location is configured.

use crate::backend::{BackendKind, CsvLedgerBackend, LedgerBackend, SqliteLedgerBackend};
use crate::context::RunContext;
use crate::dispatch::DispatchSettings;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Suffix appended to the output store name for the default attachments
/// directory.
pub const ATTACHMENTS_SUFFIX: &str = "_Attachments";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A backend was selected without its location.
    MissingPath { argument: &'static str },
    NotFound { argument: &'static str, path: PathBuf },
    WrongExtension {
        argument: &'static str,
        path: PathBuf,
        expected: &'static str,
    },
    NotADirectory { argument: &'static str, path: PathBuf },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPath { argument } => {
                write!(f, "{argument} must be specified for the selected backend")
            }
            Self::NotFound { argument, path } => {
                write!(f, "{argument}: {} path does not exist", path.display())
            }
            Self::WrongExtension {
                argument,
                path,
                expected,
            } => write!(f, "{argument}: {} must be of type {expected}", path.display()),
            Self::NotADirectory { argument, path } => {
                write!(f, "{argument}: {} is not a directory", path.display())
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Ingestion root.
    pub input: PathBuf,
    pub output_store: PathBuf,
    /// Defaults to `<output_store>_Attachments` next to the output store.
    pub attachments_dir: Option<PathBuf>,
    /// CSV ledger, required when either backend is `File`.
    pub ledger_file: Option<PathBuf>,
    /// SQLite ledger, required when either backend is `Relational`.
    pub database: Option<PathBuf>,
    /// CSV with a `Project Number` column.
    pub registry: Option<PathBuf>,
    pub load_from: BackendKind,
    pub save_to: BackendKind,
    pub resume: bool,
    pub debug: bool,
}

impl RunConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        require_existing("input", &self.input)?;
        if !self.input.is_dir() {
            return Err(ConfigError::NotADirectory {
                argument: "input",
                path: self.input.clone(),
            });
        }

        let uses_file = self.load_from == BackendKind::File || self.save_to == BackendKind::File;
        if uses_file {
            let ledger_file = self
                .ledger_file
                .as_deref()
                .ok_or(ConfigError::MissingPath {
                    argument: "ledger_file",
                })?;
            require_extension("ledger_file", ledger_file, "csv")?;
            if self.resume && self.load_from == BackendKind::File {
                require_existing("ledger_file", ledger_file)?;
            }
        }

        let uses_database =
            self.load_from == BackendKind::Relational || self.save_to == BackendKind::Relational;
        if uses_database && self.database.is_none() {
            return Err(ConfigError::MissingPath {
                argument: "database",
            });
        }

        if let Some(registry) = self.registry.as_deref() {
            require_existing("registry", registry)?;
            require_extension("registry", registry, "csv")?;
        }
        Ok(())
    }

    pub fn attachments_dir(&self) -> PathBuf {
        if let Some(dir) = &self.attachments_dir {
            return dir.clone();
        }
        let stem = self
            .output_store
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.output_store
            .with_file_name(format!("{stem}{ATTACHMENTS_SUFFIX}"))
    }

    /// Backend for `kind` at its configured location.
    pub fn backend(&self, kind: BackendKind) -> ConfigResult<Box<dyn LedgerBackend>> {
        backend_for(kind, self.ledger_file.as_deref(), self.database.as_deref())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        let mut settings =
            DispatchSettings::new(&self.input, &self.output_store, self.attachments_dir());
        for path in self.ledger_file.iter().chain(self.database.iter()) {
            settings = settings.exclude(path);
        }
        settings
    }

    pub fn context(&self) -> RunContext {
        RunContext::new(self.resume, self.debug)
    }
}

/// Backend for `kind`, failing when its location is not given.
pub fn backend_for(
    kind: BackendKind,
    ledger_file: Option<&Path>,
    database: Option<&Path>,
) -> ConfigResult<Box<dyn LedgerBackend>> {
    match kind {
        BackendKind::File => {
            let path = ledger_file.ok_or(ConfigError::MissingPath {
                argument: "ledger_file",
            })?;
            require_extension("ledger_file", path, "csv")?;
            Ok(Box::new(CsvLedgerBackend::new(path)))
        }
        BackendKind::Relational => {
            let path = database.ok_or(ConfigError::MissingPath {
                argument: "database",
            })?;
            Ok(Box::new(SqliteLedgerBackend::new(path)))
        }
    }
}

fn require_existing(argument: &'static str, path: &Path) -> ConfigResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConfigError::NotFound {
            argument,
            path: path.to_path_buf(),
        })
    }
}

fn require_extension(
    argument: &'static str,
    path: &Path,
    expected: &'static str,
) -> ConfigResult<()> {
    let matches = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(expected))
        .unwrap_or(false);
    if matches {
        Ok(())
    } else {
        Err(ConfigError::WrongExtension {
            argument,
            path: path.to_path_buf(),
            expected,
        })
    }
}
