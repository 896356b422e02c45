//! Recording collaborator doubles and an on-disk run harness.

#![allow(dead_code)]

use datatracker_core::{
    run_ingestion, AttachmentExtractor, Collaborators, ContainerInspector, ContainerKind,
    ConvertError, ConvertResult, Converter, CsvLedgerBackend, DispatchSettings, Dispatcher,
    EntryId, Ledger, Registry, RunContext, RunError, RunReport, SourceRef,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Default)]
pub struct RecordingConverter {
    pub converted: Vec<(EntryId, Option<String>)>,
    pub tracked: Vec<EntryId>,
    pub failures: BTreeMap<EntryId, ConvertError>,
    pub tracking_failures: Vec<EntryId>,
}

impl RecordingConverter {
    pub fn failing(identifier: &str, error: ConvertError) -> Self {
        let mut converter = Self::default();
        converter.failures.insert(identifier.to_string(), error);
        converter
    }

    pub fn converted_ids(&self) -> Vec<&str> {
        self.converted
            .iter()
            .map(|(identifier, _)| identifier.as_str())
            .collect()
    }
}

impl Converter for RecordingConverter {
    fn convert(&mut self, source: &SourceRef, identifier: &str) -> ConvertResult<()> {
        if let Some(error) = self.failures.get(identifier) {
            return Err(error.clone());
        }
        self.converted
            .push((identifier.to_string(), source.feature.clone()));
        Ok(())
    }

    fn enable_tracking(&mut self, identifier: &str) -> ConvertResult<()> {
        if self.tracking_failures.iter().any(|id| id == identifier) {
            return Err(ConvertError::Tool("tracking refused".to_string()));
        }
        self.tracked.push(identifier.to_string());
        Ok(())
    }
}

/// Copies each source into `<output>/proj_<identifier>/` like a real store.
pub struct StagingConverter {
    pub output: PathBuf,
    pub converted: Vec<PathBuf>,
}

impl StagingConverter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            converted: Vec::new(),
        }
    }
}

impl Converter for StagingConverter {
    fn convert(&mut self, source: &SourceRef, identifier: &str) -> ConvertResult<()> {
        let target = self.output.join(format!("proj_{identifier}"));
        fs::create_dir_all(&target).map_err(|err| ConvertError::Fatal(err.to_string()))?;
        let name = source.path.file_name().unwrap();
        fs::copy(&source.path, target.join(name))
            .map_err(|err| ConvertError::Tool(err.to_string()))?;
        self.converted.push(source.path.clone());
        Ok(())
    }

    fn enable_tracking(&mut self, _identifier: &str) -> ConvertResult<()> {
        Ok(())
    }
}

/// Returns the same feature list for every container.
#[derive(Default)]
pub struct FixedInspector {
    pub features: Vec<String>,
    pub inspected: Vec<(PathBuf, ContainerKind)>,
}

impl FixedInspector {
    pub fn with(features: &[&str]) -> Self {
        Self {
            features: features.iter().map(|feature| feature.to_string()).collect(),
            inspected: Vec::new(),
        }
    }
}

impl ContainerInspector for FixedInspector {
    fn list_features(&mut self, path: &Path, kind: ContainerKind) -> ConvertResult<Vec<String>> {
        self.inspected.push((path.to_path_buf(), kind));
        Ok(self.features.clone())
    }
}

#[derive(Default)]
pub struct FixedAttachments {
    pub mapping: BTreeMap<EntryId, PathBuf>,
}

impl AttachmentExtractor for FixedAttachments {
    fn extract(
        &mut self,
        _output_store: &Path,
        _destination: &Path,
    ) -> ConvertResult<BTreeMap<EntryId, PathBuf>> {
        Ok(self.mapping.clone())
    }
}

/// Input tree, output store and CSV ledger inside one temp directory.
pub struct Harness {
    dir: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
    pub attachments: PathBuf,
    pub ledger_path: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        fs::create_dir_all(&input).unwrap();
        Self {
            input,
            output: dir.path().join("output.gdb"),
            attachments: dir.path().join("output_Attachments"),
            ledger_path: dir.path().join("ledger.csv"),
            dir,
        }
    }

    /// Creates an empty input file (or `.gdb` directory) under the root.
    pub fn touch(&self, relative: &str) -> PathBuf {
        let path = self.input.join(relative);
        if relative.ends_with(".gdb") {
            fs::create_dir_all(&path).unwrap();
        } else {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"").unwrap();
        }
        path
    }

    pub fn backend(&self) -> CsvLedgerBackend {
        CsvLedgerBackend::new(&self.ledger_path)
    }

    pub fn stored(&self) -> Ledger {
        let mut ledger = Ledger::new();
        ledger.load(&self.backend()).unwrap();
        ledger
    }

    pub fn run(
        &self,
        resume: bool,
        converter: &mut RecordingConverter,
        inspector: &mut FixedInspector,
        attachments: &mut FixedAttachments,
    ) -> (Ledger, Result<RunReport, RunError>) {
        let settings = DispatchSettings::new(&self.input, &self.output, &self.attachments);
        self.run_with(settings, resume, converter, inspector, attachments)
    }

    /// Runs against the CSV ledger with explicit dispatch settings.
    pub fn run_with(
        &self,
        settings: DispatchSettings,
        resume: bool,
        converter: &mut dyn Converter,
        inspector: &mut dyn ContainerInspector,
        attachments: &mut dyn AttachmentExtractor,
    ) -> (Ledger, Result<RunReport, RunError>) {
        let backend = self.backend();
        let registry = Registry::new(["1234 ABC - 001"]);
        let context = RunContext::new(resume, false);
        let mut dispatcher = Dispatcher::new(
            settings,
            &registry,
            context,
            Collaborators {
                converter,
                inspector,
                attachments,
            },
        );

        let mut ledger = Ledger::new();
        let result = run_ingestion(&mut ledger, &backend, &backend, &mut dispatcher, &context);
        (ledger, result)
    }

    pub fn run_simple(
        &self,
        resume: bool,
        converter: &mut RecordingConverter,
        inspector: &mut FixedInspector,
    ) -> (Ledger, Result<RunReport, RunError>) {
        self.run(resume, converter, inspector, &mut FixedAttachments::default())
    }
}
