//! Filesystem-backed collaborators for the command-line runner.
//!
//! # Responsibility
//! - Stage converted features as `proj_<identifier>` directories inside the
//!   output store.
//! - Enumerate container features from geodatabase folders, KML text and
//!   KMZ archives.
//! - Copy `proj_<identifier>__ATTACH` folders out of the output store.
//!
//! # Invariants
//! - Problems with one input surface as `ConvertError::Tool`.
//! - An output store that cannot be created or written is
//!   `ConvertError::Fatal`.

use datatracker_core::model::entry::now_epoch_ms;
use datatracker_core::{
    AttachmentExtractor, ContainerInspector, ContainerKind, ConvertError, ConvertResult,
    Converter, EntryId, SourceRef,
};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

const FEATURE_PREFIX: &str = "proj_";
const ATTACHMENT_TABLE_SUFFIX: &str = "__ATTACH";
const SOURCE_MANIFEST: &str = "source.json";
const TRACKING_MANIFEST: &str = "tracking.json";

/// Catalog tables, lock files and bookkeeping that live inside every `.gdb`.
static GDB_SYSTEM_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(a[0-9a-f]{8}\..+|gdb|timestamps|.+\.lock)$")
        .expect("valid geodatabase system entry regex")
});

static KML_GEOMETRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:\w+:)?(Point|LineString|Polygon)\b").expect("valid kml geometry regex")
});

/// Name a converted feature carries inside the output store.
pub fn feature_name(identifier: &str) -> String {
    format!("{FEATURE_PREFIX}{identifier}")
}

#[derive(Serialize)]
struct SourceManifest<'a> {
    identifier: &'a str,
    source: String,
    feature: Option<&'a str>,
}

#[derive(Serialize)]
struct TrackingManifest<'a> {
    identifier: &'a str,
    run_id: &'a str,
    enabled_at_ms: i64,
}

/// Copies each source into its own `proj_<identifier>` folder.
pub struct StagingCopyConverter {
    output_store: PathBuf,
    run_id: String,
}

impl StagingCopyConverter {
    pub fn new(output_store: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            output_store: output_store.into(),
            run_id: run_id.into(),
        }
    }

    fn feature_dir(&self, identifier: &str) -> PathBuf {
        self.output_store.join(feature_name(identifier))
    }
}

impl Converter for StagingCopyConverter {
    fn convert(&mut self, source: &SourceRef, identifier: &str) -> ConvertResult<()> {
        fs::create_dir_all(&self.output_store).map_err(|err| {
            ConvertError::Fatal(format!(
                "cannot open output store `{}`: {err}",
                self.output_store.display()
            ))
        })?;

        // Geodatabase features are children of the container folder; every
        // other container is copied whole and labelled by the manifest.
        let origin = match source.feature.as_deref() {
            Some(feature) if source.path.is_dir() => source.path.join(feature),
            _ => source.path.clone(),
        };
        if !origin.exists() {
            return Err(ConvertError::Tool(format!(
                "source `{}` does not exist",
                origin.display()
            )));
        }

        let target = self.feature_dir(identifier);
        if target.exists() {
            debug!(
                "event=stage_replace module=fs_collab status=ok id={} path={}",
                identifier,
                target.display()
            );
            fs::remove_dir_all(&target).map_err(|err| fatal_write(&target, err))?;
        }
        fs::create_dir_all(&target).map_err(|err| fatal_write(&target, err))?;

        copy_into(&origin, &target).map_err(|err| {
            ConvertError::Tool(format!("failed to copy `{}`: {err}", origin.display()))
        })?;

        let manifest = SourceManifest {
            identifier,
            source: origin.display().to_string(),
            feature: source.feature.as_deref(),
        };
        write_manifest(&target.join(SOURCE_MANIFEST), &manifest)
    }

    fn enable_tracking(&mut self, identifier: &str) -> ConvertResult<()> {
        let target = self.feature_dir(identifier);
        if !target.is_dir() {
            return Err(ConvertError::Tool(format!(
                "feature `{}` is not staged",
                feature_name(identifier)
            )));
        }
        let manifest = TrackingManifest {
            identifier,
            run_id: &self.run_id,
            enabled_at_ms: now_epoch_ms(),
        };
        write_manifest(&target.join(TRACKING_MANIFEST), &manifest)
    }
}

/// Reads feature names straight from container files.
#[derive(Default)]
pub struct FsContainerInspector;

impl ContainerInspector for FsContainerInspector {
    fn list_features(&mut self, path: &Path, kind: ContainerKind) -> ConvertResult<Vec<String>> {
        let features = match kind {
            ContainerKind::FileGeodatabase => geodatabase_features(path),
            ContainerKind::Kml => fs::read_to_string(path).map(|text| kml_features(&text)),
            ContainerKind::Kmz => kmz_features(path),
        }
        .map_err(|err| {
            ConvertError::Tool(format!(
                "cannot inspect {} container `{}`: {err}",
                kind.as_str(),
                path.display()
            ))
        })?;

        debug!(
            "event=inspect module=fs_collab status=ok kind={} features={} path={}",
            kind.as_str(),
            features.len(),
            path.display()
        );
        Ok(features)
    }
}

fn geodatabase_features(path: &Path) -> io::Result<Vec<String>> {
    let mut names = BTreeSet::new();
    for child in fs::read_dir(path)? {
        let child = child?;
        let name = child.file_name().to_string_lossy().into_owned();
        if GDB_SYSTEM_ENTRY.is_match(&name) {
            continue;
        }
        names.insert(name);
    }
    Ok(names.into_iter().collect())
}

/// Geometry layers a KML document would split into, in layer order.
fn kml_features(text: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    for capture in KML_GEOMETRY.captures_iter(text) {
        found.insert(capture[1].to_string());
    }

    [
        ("Point", "Points"),
        ("Polygon", "Polygons"),
        ("LineString", "Lines"),
    ]
    .into_iter()
    .filter(|(geometry, _)| found.contains(*geometry))
    .map(|(_, layer)| layer.to_string())
    .collect()
}

fn kmz_features(path: &Path) -> io::Result<Vec<String>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if !file.name().to_ascii_lowercase().ends_with(".kml") {
            continue;
        }
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        return Ok(kml_features(&text));
    }
    warn!(
        "event=inspect module=fs_collab status=warn reason=kmz_without_kml path={}",
        path.display()
    );
    Ok(Vec::new())
}

/// Copies `proj_<identifier>__ATTACH` folders to `<destination>/<identifier>`.
#[derive(Default)]
pub struct AttachmentDirScanner;

impl AttachmentExtractor for AttachmentDirScanner {
    fn extract(
        &mut self,
        output_store: &Path,
        destination: &Path,
    ) -> ConvertResult<BTreeMap<EntryId, PathBuf>> {
        let mut extracted = BTreeMap::new();
        if !output_store.is_dir() {
            return Ok(extracted);
        }

        let tables = fs::read_dir(output_store).map_err(|err| {
            ConvertError::Tool(format!(
                "cannot scan output store `{}`: {err}",
                output_store.display()
            ))
        })?;
        for table in tables.flatten() {
            let name = table.file_name().to_string_lossy().into_owned();
            let Some(identifier) = name
                .strip_suffix(ATTACHMENT_TABLE_SUFFIX)
                .and_then(|feature| feature.strip_prefix(FEATURE_PREFIX))
            else {
                continue;
            };
            if !table.path().is_dir() {
                continue;
            }

            let target = destination.join(identifier);
            fs::create_dir_all(&target).map_err(|err| fatal_write(&target, err))?;
            copy_contents(&table.path(), &target).map_err(|err| {
                ConvertError::Tool(format!("failed to extract attachments of {identifier}: {err}"))
            })?;
            extracted.insert(identifier.to_string(), target);
        }
        Ok(extracted)
    }
}

/// Copies `origin` (file or folder) underneath `target`.
fn copy_into(origin: &Path, target: &Path) -> io::Result<()> {
    let name = origin
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;
    if origin.is_file() {
        fs::copy(origin, target.join(name))?;
        return Ok(());
    }
    let nested = target.join(name);
    fs::create_dir_all(&nested)?;
    copy_contents(origin, &nested)
}

fn copy_contents(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn write_manifest<T: Serialize>(path: &Path, manifest: &T) -> ConvertResult<()> {
    let body = serde_json::to_vec_pretty(manifest)
        .map_err(|err| ConvertError::Tool(format!("cannot encode manifest: {err}")))?;
    fs::write(path, body).map_err(|err| fatal_write(path, err))
}

fn fatal_write(path: &Path, err: io::Error) -> ConvertError {
    ConvertError::Fatal(format!("cannot write `{}`: {err}", path.display()))
}
