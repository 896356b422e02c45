//! Natural-key registry (the known project list).
//!
//! # Responsibility
//! - Hold the set of natural keys that are expected to appear in inputs.
//! - Answer membership with the comparison used for warnings.
//!
//! # Invariants
//! - Membership ignores ASCII case and all whitespace.
//! - A missing key is never fatal; callers only warn.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Registry column holding the natural keys in a CSV export.
pub const REGISTRY_COLUMN: &str = "Project Number";

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug)]
pub enum RegistryError {
    Csv(csv::Error),
    /// The registry table has no column with the expected name.
    MissingColumn { column: &'static str, path: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv(err) => write!(f, "{err}"),
            Self::MissingColumn { column, path } => {
                write!(f, "column `{column}` does not exist in registry `{path}`")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Csv(err) => Some(err),
            Self::MissingColumn { .. } => None,
        }
    }
}

impl From<csv::Error> for RegistryError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    keys: Vec<String>,
    lookup: BTreeSet<String>,
}

impl Registry {
    /// Builds a registry from raw keys, keeping first-seen order and
    /// discarding blanks and duplicates.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for key in keys {
            let key = key.into();
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            if registry.lookup.insert(comparable(key)) {
                registry.keys.push(key.to_string());
            }
        }
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads `REGISTRY_COLUMN` from a CSV file with a header row.
    pub fn from_csv(path: &Path) -> RegistryResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let column = reader
            .headers()?
            .iter()
            .position(|header| header.trim() == REGISTRY_COLUMN)
            .ok_or_else(|| RegistryError::MissingColumn {
                column: REGISTRY_COLUMN,
                path: path.display().to_string(),
            })?;

        let mut keys = Vec::new();
        for record in reader.records() {
            if let Some(value) = record?.get(column) {
                keys.push(value.to_string());
            }
        }
        Ok(Self::new(keys))
    }

    pub fn contains(&self, natural_key: &str) -> bool {
        self.lookup.contains(&comparable(natural_key))
    }

    /// Keys in first-seen order, as written in the source.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn comparable(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::{Registry, RegistryError};
    use std::fs;

    #[test]
    fn membership_ignores_case_and_spacing() {
        let registry = Registry::new(["1234 ABC - 001"]);
        assert!(registry.contains("1234 abc - 001"));
        assert!(registry.contains("1234ABC-001"));
        assert!(!registry.contains("1234 ABC - 002"));
    }

    #[test]
    fn new_drops_blanks_and_duplicates() {
        let registry = Registry::new(["1234 ABC - 001", " ", "1234 abc - 001", "5678 DEF - 002"]);
        assert_eq!(registry.keys(), ["1234 ABC - 001", "5678 DEF - 002"]);
    }

    #[test]
    fn from_csv_reads_project_number_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(
            &path,
            "Name,Project Number,Region\nNorth,1234 ABC - 001,A\nSouth,5678 DEF - 002,B\n",
        )
        .unwrap();

        let registry = Registry::from_csv(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("5678 DEF - 002"));
    }

    #[test]
    fn from_csv_without_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, "Name,Region\nNorth,A\n").unwrap();

        let err = Registry::from_csv(&path).unwrap_err();
        assert!(matches!(err, RegistryError::MissingColumn { .. }));
    }
}
