//! Natural-key extraction from input paths.

use crate::registry::Registry;
use once_cell::sync::Lazy;
use regex::Regex;

/// Assigned when no natural key can be found in a path.
pub const UNVERIFIED_NATURAL_KEY: &str = "0000 XXX - 000";

static NATURAL_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[\s_–-]*([a-zA-Z]{3})[\s_–-]*(\d{3})").expect("valid natural key regex")
});

/// How a natural key was obtained for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolution {
    /// Found in the path and present in the registry.
    Registered(String),
    /// Found in the path but unknown to the registry.
    Unregistered(String),
    /// Nothing matched; the sentinel key is used.
    Unverified,
}

impl KeyResolution {
    pub fn natural_key(&self) -> &str {
        match self {
            Self::Registered(key) | Self::Unregistered(key) => key,
            Self::Unverified => UNVERIFIED_NATURAL_KEY,
        }
    }
}

/// First key-shaped match in `path`, formatted as `DDDD AAA - DDD`.
pub fn extract_natural_key(path: &str) -> Option<String> {
    NATURAL_KEY_RE.captures(path).map(|caps| {
        format!("{} {} - {}", &caps[1], &caps[2], &caps[3]).to_uppercase()
    })
}

pub fn resolve_natural_key(path: &str, registry: &Registry) -> KeyResolution {
    match extract_natural_key(path) {
        Some(key) if registry.contains(&key) => KeyResolution::Registered(key),
        Some(key) => KeyResolution::Unregistered(key),
        None => KeyResolution::Unverified,
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_natural_key, resolve_natural_key, KeyResolution};
    use crate::registry::Registry;

    #[test]
    fn extraction_accepts_mixed_separators() {
        assert_eq!(
            extract_natural_key("2023/1234abc001/site.shp").as_deref(),
            Some("1234 ABC - 001")
        );
        assert_eq!(
            extract_natural_key("in/1234_abc–001_roads.kml").as_deref(),
            Some("1234 ABC - 001")
        );
        assert_eq!(
            extract_natural_key("in/1234 - XyZ - 042.gdb").as_deref(),
            Some("1234 XYZ - 042")
        );
        assert_eq!(extract_natural_key("in/no_key_here.shp"), None);
    }

    #[test]
    fn resolution_distinguishes_registered_keys() {
        let registry = Registry::new(["1234 ABC - 001"]);

        assert_eq!(
            resolve_natural_key("1234abc001.shp", &registry),
            KeyResolution::Registered("1234 ABC - 001".to_string())
        );
        assert_eq!(
            resolve_natural_key("9999zzz999.shp", &registry),
            KeyResolution::Unregistered("9999 ZZZ - 999".to_string())
        );
        let unverified = resolve_natural_key("roads.shp", &registry);
        assert_eq!(unverified.natural_key(), "0000 XXX - 000");
    }
}
