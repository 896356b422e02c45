//! Input dispatch: classification, entry creation, fan-out and conversion.
//!
//! # Responsibility
//! - Turn every discovered input into zero or more ledger entries.
//! - Drive the converter for each unprocessed spatial entry and record
//!   its progress (`in_output_store`, `tracking_enabled`, `processed`).
//! - Apply extracted attachment locations once the walk is complete.
//!
//! # Invariants
//! - New entries always get a fresh identifier from the allocator.
//! - `processed` is only ever set, never cleared.
//! - A recoverable conversion failure leaves its entry unprocessed and the
//!   walk continues; any other collaborator failure escapes as
//!   `DispatchError` so the caller can checkpoint.
//! - Container entries are all recorded before the first conversion, so an
//!   abort mid-container keeps every feature in the ledger.

pub mod classify;
pub mod natural_key;
pub mod resume;

use crate::collab::{
    AttachmentExtractor, ContainerInspector, ContainerKind, ConvertError, Converter, SourceRef,
};
use crate::context::RunContext;
use crate::discovery::discover;
use crate::ledger::{Criteria, DroppedPolicy, Ledger, LedgerError};
use crate::model::entry::{Entry, EntryId, EntryPatch, EntryType};
use crate::model::schema::Field;
use crate::paths;
use crate::registry::Registry;
use classify::{classify, AspatialKind, InputClass};
use log::{error, info, warn};
use natural_key::{resolve_natural_key, KeyResolution};
use resume::{ResumeController, ResumeDecision};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure that escapes per-entry fault isolation.
#[derive(Debug)]
pub enum DispatchError {
    Fatal {
        identifier: Option<EntryId>,
        source: ConvertError,
    },
    Ledger(LedgerError),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal {
                identifier: Some(id),
                source,
            } => write!(f, "{source} (id={id})"),
            Self::Fatal {
                identifier: None,
                source,
            } => write!(f, "{source}"),
            Self::Ledger(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fatal { source, .. } => Some(source),
            Self::Ledger(err) => Some(err),
        }
    }
}

impl From<LedgerError> for DispatchError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

/// Filesystem layout of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Ingestion root walked for inputs.
    pub root: PathBuf,
    /// Where converted features are written.
    pub output_store: PathBuf,
    /// Where extracted attachments are written.
    pub attachments_dir: PathBuf,
    /// Further paths under `root` that are never inputs (e.g. the ledger).
    pub excluded: Vec<PathBuf>,
}

impl DispatchSettings {
    pub fn new(
        root: impl Into<PathBuf>,
        output_store: impl Into<PathBuf>,
        attachments_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            output_store: output_store.into(),
            attachments_dir: attachments_dir.into(),
            excluded: Vec::new(),
        }
    }

    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    fn walk_exclusions(&self) -> Vec<PathBuf> {
        [&self.output_store, &self.attachments_dir]
            .into_iter()
            .chain(self.excluded.iter())
            .map(|path| paths::resolve(path))
            .collect()
    }
}

/// Counters reported at the end of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub created: usize,
    pub reused: usize,
    /// New entries whose raw path was already recorded under another
    /// identifier.
    pub duplicates: usize,
    pub converted: usize,
    pub failed: usize,
    pub unsupported: usize,
    pub attachments: usize,
}

/// External collaborators borrowed for the duration of a dispatch.
pub struct Collaborators<'a> {
    pub converter: &'a mut dyn Converter,
    pub inspector: &'a mut dyn ContainerInspector,
    pub attachments: &'a mut dyn AttachmentExtractor,
}

#[derive(Debug, Clone, Copy)]
struct EntryFlags {
    entry_type: EntryType,
    processed: bool,
    contains_pdf: bool,
    contains_image: bool,
}

impl EntryFlags {
    fn convertible(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            processed: false,
            contains_pdf: false,
            contains_image: false,
        }
    }

    fn recorded(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            processed: true,
            contains_pdf: false,
            contains_image: false,
        }
    }
}

/// Per-input facts shared by every entry the input produces.
struct InputRecord {
    absolute_source_path: String,
    relative_path: String,
    natural_key: String,
    decision: ResumeDecision,
}

pub struct Dispatcher<'a> {
    settings: DispatchSettings,
    registry: &'a Registry,
    context: RunContext,
    resume: ResumeController,
    collab: Collaborators<'a>,
    summary: DispatchSummary,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        settings: DispatchSettings,
        registry: &'a Registry,
        context: RunContext,
        collab: Collaborators<'a>,
    ) -> Self {
        Self {
            settings,
            registry,
            resume: ResumeController::new(context.resume),
            context,
            collab,
            summary: DispatchSummary::default(),
        }
    }

    pub fn summary(&self) -> &DispatchSummary {
        &self.summary
    }

    /// Walks the ingestion root, dispatches every input, then applies
    /// extracted attachments.
    pub fn run(&mut self, ledger: &mut Ledger) -> DispatchResult<DispatchSummary> {
        let started_at = Instant::now();
        let root = paths::resolve(&self.settings.root);
        info!(
            "event=dispatch module=dispatch status=start run_id={} root={} resume={}",
            self.context.run_id,
            root.display(),
            self.context.resume
        );

        for path in discover(&root, &self.settings.walk_exclusions()) {
            self.summary.discovered += 1;
            self.dispatch_input(ledger, &root, &path)?;
        }
        self.apply_attachments(ledger)?;

        let summary = &self.summary;
        info!(
            "event=dispatch module=dispatch status=ok run_id={} discovered={} skipped={} created={} reused={} duplicates={} converted={} failed={} unsupported={} attachments={} duration_ms={}",
            self.context.run_id,
            summary.discovered,
            summary.skipped,
            summary.created,
            summary.reused,
            summary.duplicates,
            summary.converted,
            summary.failed,
            summary.unsupported,
            summary.attachments,
            started_at.elapsed().as_millis()
        );
        Ok(self.summary.clone())
    }

    /// Classifies one input and records and converts its entries.
    pub fn dispatch_input(
        &mut self,
        ledger: &mut Ledger,
        root: &Path,
        path: &Path,
    ) -> DispatchResult<()> {
        let class = classify(path, path.is_dir());
        let Some(entry_type) = class.entry_type() else {
            if class == InputClass::Unsupported {
                self.summary.unsupported += 1;
                warn!(
                    "event=classify module=dispatch status=warn reason=unsupported_file_type path={}",
                    path.display()
                );
            }
            return Ok(());
        };

        let absolute_source_path = paths::canonicalize(path);
        let decision = self.resume.decide(ledger, &absolute_source_path);
        if decision == ResumeDecision::Skip {
            self.summary.skipped += 1;
            info!(
                "event=resume module=dispatch status=ok reason=already_processed path={}",
                absolute_source_path
            );
            return Ok(());
        }

        let relative_path = paths::relative_to(path, root);
        let input = InputRecord {
            natural_key: self.resolve_key(&relative_path),
            absolute_source_path,
            relative_path,
            decision,
        };

        match class {
            InputClass::SingleFeature => {
                let identifier = self.obtain_entry(
                    ledger,
                    &input,
                    &input.relative_path,
                    EntryFlags::convertible(entry_type),
                );
                self.convert_entry(ledger, &identifier, SourceRef::whole(path))
            }
            InputClass::Container(kind) => self.fan_out(ledger, &input, path, kind, entry_type),
            InputClass::RecordedSpatial => {
                self.record_only(ledger, &input, EntryFlags::recorded(entry_type), "spatial");
                Ok(())
            }
            InputClass::Aspatial(kind) => {
                let mut flags = EntryFlags::recorded(entry_type);
                flags.contains_pdf = kind == AspatialKind::Pdf;
                flags.contains_image = kind == AspatialKind::Image;
                self.record_only(ledger, &input, flags, kind.as_str());
                Ok(())
            }
            InputClass::Sidecar | InputClass::Unsupported => Ok(()),
        }
    }

    /// Applies the attachment extractor's mapping to the ledger.
    pub fn apply_attachments(&mut self, ledger: &mut Ledger) -> DispatchResult<usize> {
        let mapping = match self
            .collab
            .attachments
            .extract(&self.settings.output_store, &self.settings.attachments_dir)
        {
            Ok(mapping) => mapping,
            Err(err) if err.is_recoverable() => {
                warn!(
                    "event=attachments module=dispatch status=warn error={}",
                    err
                );
                return Ok(0);
            }
            Err(source) => {
                return Err(DispatchError::Fatal {
                    identifier: None,
                    source,
                })
            }
        };

        let mut applied = 0;
        for (identifier, location) in mapping {
            if !ledger.contains(&identifier) {
                warn!(
                    "event=attachments module=dispatch status=warn id={} reason=unknown_identifier",
                    identifier
                );
                continue;
            }
            ledger.set(
                &identifier,
                &EntryPatch {
                    extracted_attachments_path: Some(paths::to_slash_string(&location)),
                    ..EntryPatch::default()
                },
            )?;
            applied += 1;
        }

        self.summary.attachments = applied;
        info!(
            "event=attachments module=dispatch status=ok applied={}",
            applied
        );
        Ok(applied)
    }

    fn resolve_key(&self, relative_path: &str) -> String {
        let resolution = resolve_natural_key(relative_path, self.registry);
        match &resolution {
            KeyResolution::Registered(_) => {}
            KeyResolution::Unregistered(key) => warn!(
                "event=natural_key module=dispatch status=warn reason=not_in_registry natural_key={} path={}",
                key, relative_path
            ),
            KeyResolution::Unverified => warn!(
                "event=natural_key module=dispatch status=warn reason=not_found fallback={} path={}",
                resolution.natural_key(),
                relative_path
            ),
        }
        resolution.natural_key().to_string()
    }

    fn fan_out(
        &mut self,
        ledger: &mut Ledger,
        input: &InputRecord,
        path: &Path,
        kind: ContainerKind,
        entry_type: EntryType,
    ) -> DispatchResult<()> {
        let features = match self.collab.inspector.list_features(path, kind) {
            Ok(features) => features,
            Err(err) if err.is_recoverable() => {
                self.summary.failed += 1;
                error!(
                    "event=fan_out module=dispatch status=error kind={} path={} error={}",
                    kind.as_str(),
                    input.relative_path,
                    err
                );
                return Ok(());
            }
            Err(source) => {
                return Err(DispatchError::Fatal {
                    identifier: None,
                    source,
                })
            }
        };

        if features.is_empty() {
            warn!(
                "event=fan_out module=dispatch status=warn kind={} reason=no_features path={}",
                kind.as_str(),
                input.relative_path
            );
            return Ok(());
        }

        // The first feature's entry is the container's own entry.
        let mut recorded = Vec::with_capacity(features.len());
        for feature in features {
            let raw_relative_path = format!("{}/{}", input.relative_path, feature);
            let flags = EntryFlags::convertible(entry_type);
            let identifier = self.obtain_entry(ledger, input, &raw_relative_path, flags);
            recorded.push((identifier, feature));
        }
        info!(
            "event=fan_out module=dispatch status=ok kind={} features={} container_id={} path={}",
            kind.as_str(),
            recorded.len(),
            recorded[0].0,
            input.relative_path
        );

        for (identifier, feature) in recorded {
            self.convert_entry(ledger, &identifier, SourceRef::feature(path, feature))?;
        }
        Ok(())
    }

    fn record_only(
        &mut self,
        ledger: &mut Ledger,
        input: &InputRecord,
        flags: EntryFlags,
        kind: &str,
    ) {
        let identifier = self.obtain_entry(ledger, input, &input.relative_path, flags);
        warn!(
            "event=record_only module=dispatch status=warn id={} kind={} reason=not_copied_to_output_store path={}",
            identifier, kind, input.relative_path
        );
    }

    /// Returns the entry for one feature, creating it unless a resumed
    /// input already recorded it.
    fn obtain_entry(
        &mut self,
        ledger: &mut Ledger,
        input: &InputRecord,
        raw_relative_path: &str,
        flags: EntryFlags,
    ) -> EntryId {
        if input.decision == ResumeDecision::Continue {
            if let Some(entry) =
                self.resume
                    .recorded_entry(ledger, &input.absolute_source_path, raw_relative_path)
            {
                self.summary.reused += 1;
                info!(
                    "event=entry_reuse module=dispatch status=ok id={} processed={} raw_path={}",
                    entry.identifier, entry.processed, raw_relative_path
                );
                return entry.identifier.clone();
            }
        }

        let identifier = ledger.allocate_identifier(&input.natural_key);
        let duplicate = Criteria::new().with(Field::RawRelativePath, raw_relative_path);
        if let Some((existing, _)) = ledger.find(&duplicate, DroppedPolicy::Exclude) {
            self.summary.duplicates += 1;
            warn!(
                "event=duplicate_raw_path module=dispatch status=warn id={} duplicate_of={} raw_path={}",
                identifier, existing, raw_relative_path
            );
        }

        let mut entry = Entry::new(identifier.clone(), input.natural_key.clone(), flags.entry_type);
        entry.raw_relative_path = raw_relative_path.to_string();
        entry.raw_container_path = input.relative_path.clone();
        entry.absolute_source_path = input.absolute_source_path.clone();
        entry.contains_pdf = flags.contains_pdf;
        entry.contains_image = flags.contains_image;
        entry.processed = flags.processed;
        ledger.add(entry);
        self.summary.created += 1;

        if self.context.debug {
            info!(
                "event=entry_create module=dispatch status=ok id={} natural_key={} raw_path={}",
                identifier, input.natural_key, raw_relative_path
            );
        }
        identifier
    }

    fn convert_entry(
        &mut self,
        ledger: &mut Ledger,
        identifier: &str,
        source: SourceRef,
    ) -> DispatchResult<()> {
        if ledger.get(identifier)?.processed {
            return Ok(());
        }

        if let Err(err) = self.collab.converter.convert(&source, identifier) {
            if !err.is_recoverable() {
                error!(
                    "event=convert module=dispatch status=error id={} path={} error={}",
                    identifier,
                    source.path.display(),
                    err
                );
                return Err(DispatchError::Fatal {
                    identifier: Some(identifier.to_string()),
                    source: err,
                });
            }
            self.summary.failed += 1;
            error!(
                "event=convert module=dispatch status=error id={} path={} error={} hint=fix_or_drop_then_resume",
                identifier,
                source.path.display(),
                err
            );
            return Ok(());
        }

        ledger.set(
            identifier,
            &EntryPatch {
                in_output_store: Some(true),
                ..EntryPatch::default()
            },
        )?;
        self.summary.converted += 1;

        match self.collab.converter.enable_tracking(identifier) {
            Ok(()) => ledger.set(
                identifier,
                &EntryPatch {
                    tracking_enabled: Some(true),
                    ..EntryPatch::default()
                },
            )?,
            Err(err) if err.is_recoverable() => warn!(
                "event=tracking module=dispatch status=warn id={} error={}",
                identifier, err
            ),
            Err(source) => {
                return Err(DispatchError::Fatal {
                    identifier: Some(identifier.to_string()),
                    source,
                })
            }
        }

        ledger.set(
            identifier,
            &EntryPatch {
                processed: Some(true),
                ..EntryPatch::default()
            },
        )?;
        info!(
            "event=convert module=dispatch status=ok id={} path={}",
            identifier,
            source.path.display()
        );
        Ok(())
    }
}
