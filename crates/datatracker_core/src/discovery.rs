//! Input discovery under the ingestion root.
//!
//! # Invariants
//! - Inputs are yielded in file-name order at every level, so runs over an
//!   unchanged tree are reproducible.
//! - `.gdb` directories are single inputs and are never descended into.
//! - Excluded paths (the output store, the attachments directory) and
//!   everything below them are skipped.
//! - Unreadable directory entries are logged and skipped.

use log::warn;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory suffix of file geodatabases.
pub const GEODATABASE_SUFFIX: &str = ".gdb";

/// Walks `root` and yields every input path.
pub fn discover(root: &Path, excluded: &[PathBuf]) -> Discovery {
    Discovery {
        walker: WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter(),
        excluded: excluded.to_vec(),
    }
}

pub struct Discovery {
    walker: walkdir::IntoIter,
    excluded: Vec<PathBuf>,
}

impl Iterator for Discovery {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        "event=discovery module=discovery status=warn reason=walk_error error={}",
                        err
                    );
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let is_dir = entry.file_type().is_dir();
            if self.is_excluded(entry.path()) {
                if is_dir {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if is_dir {
                if is_geodatabase(entry.path()) {
                    self.walker.skip_current_dir();
                    return Some(entry.into_path());
                }
                continue;
            }
            return Some(entry.into_path());
        }
    }
}

impl Discovery {
    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded
            .iter()
            .any(|excluded| path.starts_with(excluded))
    }
}

pub fn is_geodatabase(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(GEODATABASE_SUFFIX)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::discover;
    use std::fs;

    #[test]
    fn geodatabases_are_single_inputs_and_exclusions_apply() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/site.gdb/a00000001.gdbtable")).unwrap();
        fs::write(root.join("b/site.gdb/gdb"), b"").unwrap();
        fs::write(root.join("a.shp"), b"").unwrap();
        fs::create_dir_all(root.join("out")).unwrap();
        fs::write(root.join("out/proj_1.shp"), b"").unwrap();

        let found = discover(root, &[root.join("out")])
            .map(|path| path.strip_prefix(root).unwrap().to_path_buf())
            .collect::<Vec<_>>();

        assert_eq!(
            found,
            vec![
                std::path::PathBuf::from("a.shp"),
                std::path::PathBuf::from("b/site.gdb"),
            ]
        );
    }
}
