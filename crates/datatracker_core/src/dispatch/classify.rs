//! Extension-based classification of discovered inputs.
//!
//! Matching is case-insensitive on the final extension; `.gdb` only counts
//! when the input is a directory.

use crate::collab::ContainerKind;
use crate::model::entry::EntryType;
use std::path::Path;

const LAYOUT_EXTENSIONS: &[&str] = &["mxd", "aprx", "pagx", "qgs", "qgz", "qlr"];
const DATA_SHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv", "docx"];
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "heic", "mp4",
];
const SINGLE_FEATURE_EXTENSIONS: &[&str] = &["shp", "geojson"];
const RECORDED_SPATIAL_EXTENSIONS: &[&str] = &["gpkg", "sqlite"];
const SIDECAR_EXTENSIONS: &[&str] = &["lock", "cpg", "dbf", "prj", "sbn", "sbx", "shx", "xml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspatialKind {
    Layout,
    DataSheet,
    Image,
    Pdf,
}

impl AspatialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::DataSheet => "data_sheet",
            Self::Image => "image",
            Self::Pdf => "pdf",
        }
    }
}

/// Dispatch treatment of one discovered input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    /// Multi-feature input; one entry per feature.
    Container(ContainerKind),
    /// One feature, converted.
    SingleFeature,
    /// One spatial entry recorded as processed, never converted.
    RecordedSpatial,
    /// One aspatial entry recorded as processed, never converted.
    Aspatial(AspatialKind),
    /// Shapefile component or lock file, silently ignored.
    Sidecar,
    Unsupported,
}

impl InputClass {
    /// Entry type of the entries this class produces, if any.
    pub fn entry_type(self) -> Option<EntryType> {
        match self {
            Self::Container(_) | Self::SingleFeature | Self::RecordedSpatial => {
                Some(EntryType::Spatial)
            }
            Self::Aspatial(_) => Some(EntryType::Aspatial),
            Self::Sidecar | Self::Unsupported => None,
        }
    }
}

pub fn classify(path: &Path, is_dir: bool) -> InputClass {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let extension = extension.as_str();

    if is_dir {
        return if extension == "gdb" {
            InputClass::Container(ContainerKind::FileGeodatabase)
        } else {
            InputClass::Unsupported
        };
    }

    match extension {
        "kml" => InputClass::Container(ContainerKind::Kml),
        "kmz" => InputClass::Container(ContainerKind::Kmz),
        "pdf" => InputClass::Aspatial(AspatialKind::Pdf),
        ext if SINGLE_FEATURE_EXTENSIONS.contains(&ext) => InputClass::SingleFeature,
        ext if RECORDED_SPATIAL_EXTENSIONS.contains(&ext) => InputClass::RecordedSpatial,
        ext if LAYOUT_EXTENSIONS.contains(&ext) => InputClass::Aspatial(AspatialKind::Layout),
        ext if DATA_SHEET_EXTENSIONS.contains(&ext) => {
            InputClass::Aspatial(AspatialKind::DataSheet)
        }
        ext if IMAGE_EXTENSIONS.contains(&ext) => InputClass::Aspatial(AspatialKind::Image),
        ext if SIDECAR_EXTENSIONS.contains(&ext) => InputClass::Sidecar,
        _ => InputClass::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, AspatialKind, InputClass};
    use crate::collab::ContainerKind;
    use crate::model::entry::EntryType;
    use std::path::Path;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(classify(Path::new("a/B.SHP"), false), InputClass::SingleFeature);
        assert_eq!(
            classify(Path::new("a/b.KmZ"), false),
            InputClass::Container(ContainerKind::Kmz)
        );
    }

    #[test]
    fn gdb_is_a_container_only_as_directory() {
        assert_eq!(
            classify(Path::new("site.gdb"), true),
            InputClass::Container(ContainerKind::FileGeodatabase)
        );
        assert_eq!(classify(Path::new("site.gdb"), false), InputClass::Unsupported);
    }

    #[test]
    fn aspatial_kinds_are_distinguished() {
        assert_eq!(
            classify(Path::new("map.aprx"), false),
            InputClass::Aspatial(AspatialKind::Layout)
        );
        assert_eq!(
            classify(Path::new("sheet.xls"), false),
            InputClass::Aspatial(AspatialKind::DataSheet)
        );
        assert_eq!(
            classify(Path::new("photo.heic"), false),
            InputClass::Aspatial(AspatialKind::Image)
        );
        assert_eq!(
            classify(Path::new("report.pdf"), false),
            InputClass::Aspatial(AspatialKind::Pdf)
        );
    }

    #[test]
    fn sidecars_recorded_and_unknown_files() {
        assert_eq!(classify(Path::new("a.dbf"), false), InputClass::Sidecar);
        assert_eq!(classify(Path::new("a.gpkg"), false), InputClass::RecordedSpatial);
        assert_eq!(classify(Path::new("notes.txt"), false), InputClass::Unsupported);
        assert_eq!(classify(Path::new("README"), false), InputClass::Unsupported);
    }

    #[test]
    fn only_recordable_classes_carry_an_entry_type() {
        let kml = classify(Path::new("site.kml"), false);
        assert_eq!(kml.entry_type(), Some(EntryType::Spatial));
        assert_eq!(
            classify(Path::new("a.gpkg"), false).entry_type(),
            Some(EntryType::Spatial)
        );
        assert_eq!(
            classify(Path::new("photo.jpg"), false).entry_type(),
            Some(EntryType::Aspatial)
        );
        assert_eq!(classify(Path::new("a.shx"), false).entry_type(), None);
        assert_eq!(classify(Path::new("notes.txt"), false).entry_type(), None);
    }
}
