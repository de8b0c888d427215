//! Batch Orchestrator - Single Entry Point
//!
//! CRITICAL: every artboard iteration runs inside a checkpoint on the master
//! and ends with its unit discarded. No bypass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::color::ColorNormalizer;
use crate::config::{BatchConfig, Variant};
use crate::enumerate::{enumerate_artboards, ArtboardHandle};
use crate::export::{Codec, ExportedFile, Exporter};
use crate::hashing::compute_names_digest;
use crate::host::{Checkpoint, DocumentId, Host, HostError};
use crate::isolate::LayerIsolator;
use crate::metadata::MetadataSanitizer;
use crate::naming::{strip_extension, suggested_prefix, NameRegistry, NameResolver};
use crate::prompt::{Notifier, Prompt, Prompter};
use crate::{ENGINE_VERSION, MIN_HOST_VERSION};

#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("You must have a document open!")]
    NoDocument,

    #[error("Active document is unreadable: {0}")]
    Document(#[source] HostError),

    #[error("Host version {found} is below {required}, native WebP export is unavailable")]
    HostTooOld { found: String, required: String },

    #[error("Unrecognised host version: {0}")]
    InvalidHostVersion(String),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Could not create scratch document: {0}")]
    Scratch(#[source] HostError),

    #[error("Could not restore master after artboard {ordinal}: {source}")]
    Rollback {
        ordinal: usize,
        #[source]
        source: HostError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchState {
    Idle,
    Enumerating,
    Isolating,
    Sanitizing,
    Normalizing,
    Naming,
    Exporting,
    Discarding,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtboardFailure {
    pub ordinal: usize,
    pub artboard: String,
    pub state: BatchState,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtboardExport {
    pub ordinal: usize,
    pub artboard: String,
    #[serde(flatten)]
    pub file: ExportedFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub variant: Variant,
    pub destination: PathBuf,
    pub artboards: usize,
    pub webp_written: usize,
    pub jpeg_written: usize,
    pub files: Vec<ArtboardExport>,
    pub failures: Vec<ArtboardFailure>,
    pub enumeration_error: Option<String>,
    pub names: Vec<String>,
    pub names_digest: String,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.enumeration_error.is_none()
    }

    /// Text of the final notification.
    pub fn message(&self) -> String {
        let destination = self.destination.display();
        if self.variant.codecs().contains(&Codec::Jpeg) {
            format!(
                "{} WebP and {} JPEG files saved to:\n{}",
                self.webp_written, self.jpeg_written, destination
            )
        } else {
            format!("{} WebP files saved to:\n{}", self.webp_written, destination)
        }
    }
}

#[derive(Debug)]
pub enum BatchOutcome {
    Completed(BatchSummary),
    /// A required prompt was cancelled before anything was touched.
    Cancelled(Prompt),
}

/// Normalises `"23"`, `"23.5"` or `"25.0.1 20230816.r.112"` to semver.
pub fn parse_host_version(version: &str) -> Result<semver::Version, PreconditionError> {
    let invalid = || PreconditionError::InvalidHostVersion(version.to_string());
    let head = version.split_whitespace().next().ok_or_else(invalid)?;

    let mut parts = [0u64; 3];
    for (i, part) in head.split('.').take(3).enumerate() {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            if i == 0 {
                return Err(invalid());
            }
            break;
        }
        parts[i] = digits.parse().map_err(|_| invalid())?;
    }
    Ok(semver::Version::new(parts[0], parts[1], parts[2]))
}

pub fn check_host_version(version: &str) -> Result<(), PreconditionError> {
    let found = parse_host_version(version)?;
    let required = semver::Version::parse(MIN_HOST_VERSION)
        .map_err(|_| PreconditionError::InvalidHostVersion(MIN_HOST_VERSION.to_string()))?;
    if found < required {
        return Err(PreconditionError::HostTooOld {
            found: version.to_string(),
            required: MIN_HOST_VERSION.to_string(),
        });
    }
    Ok(())
}

/// Restores the captured checkpoint when dropped, unless restored explicitly.
pub struct CheckpointGuard<'a, H: Host + ?Sized> {
    host: &'a mut H,
    checkpoint: Option<Checkpoint>,
}

impl<'a, H: Host + ?Sized> CheckpointGuard<'a, H> {
    pub fn begin(host: &'a mut H, doc: DocumentId) -> Result<Self, HostError> {
        let checkpoint = host.begin_checkpoint(doc)?;
        Ok(Self {
            host,
            checkpoint: Some(checkpoint),
        })
    }

    pub fn host(&mut self) -> &mut H {
        &mut *self.host
    }

    pub fn restore(mut self) -> Result<(), HostError> {
        match self.checkpoint.take() {
            Some(checkpoint) => self.host.restore(checkpoint),
            None => Ok(()),
        }
    }
}

impl<H: Host + ?Sized> Drop for CheckpointGuard<'_, H> {
    fn drop(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            if let Err(e) = self.host.restore(checkpoint) {
                tracing::error!(document = %checkpoint.document, error = %e, "Checkpoint restore failed");
            }
        }
    }
}

struct RunContext<'a> {
    document_name: &'a str,
    prefix: Option<&'a str>,
    destination: &'a Path,
}

struct RunState {
    total: usize,
    registry: NameRegistry,
    names: Vec<String>,
    files: Vec<ArtboardExport>,
    failures: Vec<ArtboardFailure>,
}

impl RunState {
    fn fail(&mut self, ordinal: usize, artboard: &str, state: BatchState, message: String) {
        self.failures.push(ArtboardFailure {
            ordinal,
            artboard: artboard.to_string(),
            state,
            message,
        });
    }
}

fn enter(ordinal: Option<usize>, state: BatchState) {
    tracing::debug!(ordinal, state = ?state, "State transition");
}

/// The batch pipeline - single entry point for an export run
pub struct BatchOrchestrator {
    config: BatchConfig,
    isolator: LayerIsolator,
    sanitizer: MetadataSanitizer,
    normalizer: ColorNormalizer,
    resolver: NameResolver,
    exporter: Exporter,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            isolator: LayerIsolator::new(),
            sanitizer: MetadataSanitizer::new(),
            normalizer: ColorNormalizer::new(config.canonical_profile.clone()),
            resolver: NameResolver::new(config.substitute(), config.separator.clone()),
            exporter: Exporter::new(config.variant.codecs(), config.codec_failure),
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    /// Runs the whole batch against the host's active document.
    pub fn run<H: Host + ?Sized>(
        &self,
        host: &mut H,
        prompter: &mut dyn Prompter,
        notifier: &mut dyn Notifier,
    ) -> Result<BatchOutcome, BatchError> {
        let started_at = Utc::now();
        let rich = self.config.variant.is_rich();
        enter(None, BatchState::Idle);

        let (active, document_name) = match self.preflight(host) {
            Ok(found) => found,
            Err(e) => {
                notifier.alert(&e.to_string());
                return Err(e.into());
            }
        };

        let Some(destination) = prompter.destination_folder() else {
            notifier.beep();
            return Ok(BatchOutcome::Cancelled(Prompt::Destination));
        };

        let prefix = if rich {
            let suggestion = suggested_prefix(&document_name, &self.config.prefix_separator);
            match prompter.prefix(&suggestion) {
                Some(prefix) => Some(prefix),
                None => {
                    notifier.beep();
                    return Ok(BatchOutcome::Cancelled(Prompt::Prefix));
                }
            }
        } else {
            None
        };

        // MANDATORY: the rich variant never touches the session document.
        let master = if rich {
            host.duplicate_document(active, strip_extension(&document_name))
                .map_err(BatchError::Scratch)?
        } else {
            active
        };

        tracing::info!(
            document = %document_name,
            destination = %destination.display(),
            variant = ?self.config.variant,
            "Starting artboard export"
        );

        enter(None, BatchState::Enumerating);
        let (artboards, enumeration_error) = match enumerate_artboards(host, master) {
            Ok(artboards) => (artboards, None),
            Err(e) => {
                tracing::error!(error = %e, "Artboard enumeration failed");
                notifier.alert(&e.to_string());
                (vec![], Some(e.to_string()))
            }
        };

        let context = RunContext {
            document_name: &document_name,
            prefix: prefix.as_deref(),
            destination: &destination,
        };
        let mut state = RunState {
            total: artboards.len(),
            registry: NameRegistry::new(self.config.collision),
            names: vec![],
            files: vec![],
            failures: vec![],
        };

        for artboard in &artboards {
            if let Err(e) = self.process_artboard(host, master, *artboard, &context, &mut state, notifier) {
                tracing::error!(error = %e, "Aborting batch");
                if let Err(close) = host.close_without_saving(master) {
                    tracing::warn!(error = %close, "Failed to close master document");
                }
                notifier.alert(&e.to_string());
                return Err(e);
            }
        }

        enter(None, BatchState::Finalizing);
        if let Err(e) = host.close_without_saving(master) {
            tracing::warn!(document = %master, error = %e, "Failed to close master document");
        }

        let count = |codec: Codec| state.files.iter().filter(|f| f.file.codec == codec).count();
        let summary = BatchSummary {
            run_id: Uuid::new_v4(),
            engine_version: ENGINE_VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            variant: self.config.variant,
            destination: destination.clone(),
            artboards: artboards.len(),
            webp_written: count(Codec::WebP),
            jpeg_written: count(Codec::Jpeg),
            names_digest: compute_names_digest(&state.names)?,
            names: state.names,
            files: state.files,
            failures: state.failures,
            enumeration_error,
        };

        tracing::info!(
            artboards = summary.artboards,
            webp = summary.webp_written,
            jpeg = summary.jpeg_written,
            failures = summary.failures.len(),
            "Artboard export completed"
        );
        enter(None, BatchState::Done);

        notifier.beep();
        notifier.finished(&summary);
        Ok(BatchOutcome::Completed(summary))
    }

    fn preflight<H: Host + ?Sized>(&self, host: &H) -> Result<(DocumentId, String), PreconditionError> {
        check_host_version(host.version())?;
        let active = host.active_document().ok_or(PreconditionError::NoDocument)?;
        let info = host.document_info(active).map_err(PreconditionError::Document)?;
        Ok((active, info.name))
    }

    /// One iteration inside a checkpoint on `master`.
    fn process_artboard<H: Host + ?Sized>(
        &self,
        host: &mut H,
        master: DocumentId,
        artboard: ArtboardHandle,
        context: &RunContext<'_>,
        state: &mut RunState,
        notifier: &mut dyn Notifier,
    ) -> Result<(), BatchError> {
        let mut guard = match CheckpointGuard::begin(host, master) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(ordinal = artboard.ordinal, error = %e, "Could not checkpoint master, skipping artboard");
                notifier.progress(artboard.ordinal + 1, state.total, "");
                state.fail(artboard.ordinal, "", BatchState::Isolating, e.to_string());
                return Ok(());
            }
        };

        self.iterate(guard.host(), master, artboard, context, state, notifier);

        guard.restore().map_err(|source| BatchError::Rollback {
            ordinal: artboard.ordinal,
            source,
        })
    }

    fn iterate<H: Host + ?Sized>(
        &self,
        host: &mut H,
        master: DocumentId,
        artboard: ArtboardHandle,
        context: &RunContext<'_>,
        state: &mut RunState,
        notifier: &mut dyn Notifier,
    ) {
        let ordinal = artboard.ordinal;

        enter(Some(ordinal), BatchState::Isolating);
        let unit = match self.isolator.isolate(host, master, artboard) {
            Ok(unit) => {
                notifier.progress(ordinal + 1, state.total, unit.layer_name());
                unit
            }
            Err(e) => {
                notifier.progress(ordinal + 1, state.total, &e.name);
                tracing::error!(ordinal, error = %e, "Artboard isolation failed, continuing");
                notifier.alert(&e.to_string());
                state.fail(ordinal, &e.name, BatchState::Isolating, e.to_string());
                enter(Some(ordinal), BatchState::Discarding);
                return;
            }
        };
        let doc = unit.document();

        if self.config.variant.is_rich() {
            enter(Some(ordinal), BatchState::Sanitizing);
            let report = self.sanitizer.sanitize(host, doc);
            tracing::debug!(ordinal, removed = ?report.removed, skipped = ?report.skipped, "Sanitized unit");

            enter(Some(ordinal), BatchState::Normalizing);
            let report = self.normalizer.normalize(host, doc);
            tracing::debug!(ordinal, converted = report.converted_profile, "Normalized unit");
        }

        enter(Some(ordinal), BatchState::Naming);
        let name = state.registry.claim(self.resolver.resolve(
            context.document_name,
            unit.layer_name(),
            context.prefix,
        ));
        state.names.push(name.clone());

        enter(Some(ordinal), BatchState::Exporting);
        for result in self.exporter.export(host, doc, context.destination, &name) {
            match result {
                Ok(file) => state.files.push(ArtboardExport {
                    ordinal,
                    artboard: unit.layer_name().to_string(),
                    file,
                }),
                Err(e) => state.fail(ordinal, unit.layer_name(), BatchState::Exporting, e.to_string()),
            }
        }
        tracing::info!(ordinal, artboard = unit.layer_name(), name = %name, "Exported artboard");

        enter(Some(ordinal), BatchState::Discarding);
        unit.discard(host);
    }
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_version_forms() {
        assert_eq!(parse_host_version("23").unwrap(), semver::Version::new(23, 0, 0));
        assert_eq!(parse_host_version("23.5").unwrap(), semver::Version::new(23, 5, 0));
        assert_eq!(
            parse_host_version("25.0.1 20230816.r.112").unwrap(),
            semver::Version::new(25, 0, 1)
        );
        assert!(parse_host_version("beta").is_err());
        assert!(parse_host_version("").is_err());
    }

    #[test]
    fn test_version_guard() {
        assert!(check_host_version("23.0.0").is_ok());
        assert!(check_host_version("26.1").is_ok());
        assert!(matches!(
            check_host_version("22.5.1"),
            Err(PreconditionError::HostTooOld { .. })
        ));
    }
}
