//! Path normalization used for every path equality check.
//!
//! # Invariants
//! - Canonical strings use `/` separators and carry no Windows verbatim
//!   prefix, so the same input compares equal across runs and platforms.
//! - Canonicalization never fails: missing paths are absolutized lexically.

use std::path::{Component, Path, PathBuf};

/// Returns the canonical absolute form of `path` as a string.
pub fn canonicalize(path: &Path) -> String {
    normalize_separators(&resolve(path).to_string_lossy())
}

/// Canonical absolute form of `path`, which need not exist yet.
///
/// The deepest existing ancestor is resolved on disk and the missing tail
/// is appended after lexical `.`/`..` folding, so a path created later
/// still compares equal to what the walker reports for it.
pub fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let absolute = absolutize(path);
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = std::fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(resolved, |resolved, name| resolved.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// `path` relative to `root`, `/`-separated.
///
/// Falls back to the full normalized path when `path` is outside `root`.
pub fn relative_to(path: &Path, root: &Path) -> String {
    to_slash_string(path.strip_prefix(root).unwrap_or(path))
}

/// `path` as stored in the ledger, without resolving it.
pub fn to_slash_string(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn normalize_separators(value: &str) -> String {
    let value = if let Some(rest) = value.strip_prefix(r"\\?\UNC\") {
        format!(r"\\{rest}")
    } else if let Some(rest) = value.strip_prefix(r"\\?\") {
        rest.to_string()
    } else {
        value.to_string()
    };
    value.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::{canonicalize, normalize_separators, relative_to, resolve};
    use std::path::Path;

    #[test]
    fn verbatim_prefixes_are_stripped() {
        assert_eq!(normalize_separators(r"\\?\C:\data\a.shp"), "C:/data/a.shp");
        assert_eq!(
            normalize_separators(r"\\?\UNC\server\share\a.shp"),
            "//server/share/a.shp"
        );
    }

    #[test]
    fn existing_and_dotted_paths_compare_equal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.shp");
        std::fs::write(&file, b"").unwrap();
        let dotted = dir.path().join(".").join("a.shp");

        assert_eq!(canonicalize(&file), canonicalize(&dotted));
        assert!(!canonicalize(&file).contains('\\'));
    }

    #[test]
    fn missing_paths_are_absolutized_lexically() {
        let canonical = canonicalize(Path::new("/no/such/dir/../file.kml"));
        assert!(canonical.ends_with("/no/such/file.kml"));
    }

    #[test]
    fn missing_path_under_existing_directory_resolves_through_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("z")).unwrap();
        let spelled = dir.path().join("z").join("..").join("z").join("out.gdb");

        let resolved = resolve(&spelled);
        assert_eq!(
            resolved,
            std::fs::canonicalize(dir.path().join("z")).unwrap().join("out.gdb")
        );

        std::fs::create_dir_all(dir.path().join("z").join("out.gdb")).unwrap();
        assert_eq!(resolve(&spelled), resolved);
    }

    #[test]
    fn relative_to_uses_forward_slashes() {
        let relative = relative_to(Path::new("/root/in/1234/a.shp"), Path::new("/root/in"));
        assert_eq!(relative, "1234/a.shp");
    }
}
