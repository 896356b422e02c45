//! Contracts for the external collaborators driven by the dispatcher.
//!
//! # Responsibility
//! - Describe conversion, container inspection and attachment extraction
//!   without committing to a concrete geometry toolkit.
//!
//! # Invariants
//! - Collaborators never touch the ledger; the dispatcher records their
//!   outcomes.
//! - A `ConvertError::Tool` is scoped to one entry. Anything else aborts the
//!   run through the checkpoint path.

use crate::model::entry::EntryId;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Container formats whose features are enumerated individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `.gdb` directory.
    FileGeodatabase,
    Kml,
    Kmz,
}

impl ContainerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileGeodatabase => "gdb",
            Self::Kml => "kml",
            Self::Kmz => "kmz",
        }
    }
}

/// What a converter is asked to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    /// Absolute path of the discovered input.
    pub path: PathBuf,
    /// Feature name inside a container, `None` for single-feature inputs.
    pub feature: Option<String>,
}

impl SourceRef {
    pub fn whole(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            feature: None,
        }
    }

    pub fn feature(path: impl Into<PathBuf>, feature: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            feature: Some(feature.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Conversion tool rejected this input. The run continues.
    Tool(String),
    /// Output store or environment is unusable. The run aborts.
    Fatal(String),
}

impl ConvertError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Tool(_))
    }
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool(message) => write!(f, "conversion failed: {message}"),
            Self::Fatal(message) => write!(f, "fatal conversion error: {message}"),
        }
    }
}

impl Error for ConvertError {}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Writes a canonical feature named after its identifier.
pub trait Converter {
    fn convert(&mut self, source: &SourceRef, identifier: &str) -> ConvertResult<()>;

    /// Turns on change tracking for an already converted feature.
    fn enable_tracking(&mut self, identifier: &str) -> ConvertResult<()>;
}

/// Lists the features of a container input.
pub trait ContainerInspector {
    fn list_features(&mut self, path: &Path, kind: ContainerKind) -> ConvertResult<Vec<String>>;
}

/// Extracts attachments from the output store.
pub trait AttachmentExtractor {
    /// Maps identifier to extracted attachment location.
    fn extract(
        &mut self,
        output_store: &Path,
        destination: &Path,
    ) -> ConvertResult<BTreeMap<EntryId, PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::{ConvertError, SourceRef};

    #[test]
    fn only_tool_errors_are_recoverable() {
        assert!(ConvertError::Tool("bad geometry".to_string()).is_recoverable());
        assert!(!ConvertError::Fatal("store locked".to_string()).is_recoverable());
    }

    #[test]
    fn source_ref_constructors_set_feature() {
        assert_eq!(SourceRef::whole("/in/a.shp").feature, None);
        assert_eq!(
            SourceRef::feature("/in/b.kml", "Points").feature.as_deref(),
            Some("Points")
        );
    }
}
