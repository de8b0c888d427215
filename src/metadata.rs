//! Metadata Sanitizer
//!
//! Every removal is best-effort. A missing document or an unavailable
//! metadata subsystem degrades to a skip, never to an error.

use serde::Serialize;
use thiserror::Error;

use crate::host::{DocumentId, Host, HostError, MetadataKind};

/// Removals applied before any codec write, narrowest first.
pub const SANITIZE_KINDS: [MetadataKind; 3] = [
    MetadataKind::DocumentAncestors,
    MetadataKind::CameraRaw,
    MetadataKind::Descriptive,
];

#[derive(Debug, Error)]
#[error("Metadata removal ({kind:?}) skipped: {source}")]
pub struct MetadataError {
    pub kind: MetadataKind,
    #[source]
    pub source: HostError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    pub removed: Vec<MetadataKind>,
    pub skipped: Vec<MetadataKind>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataSanitizer;

impl MetadataSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Removes document ancestry, camera raw settings and then every
    /// descriptive property from `doc`.
    pub fn sanitize<H: Host + ?Sized>(&self, host: &mut H, doc: DocumentId) -> SanitizeReport {
        let mut report = SanitizeReport::default();
        for kind in SANITIZE_KINDS {
            match self.remove(host, doc, kind) {
                Ok(true) => report.removed.push(kind),
                Ok(false) => report.skipped.push(kind),
                Err(e) => {
                    tracing::debug!(error = %e, "Metadata removal degraded to skip");
                    report.skipped.push(kind);
                }
            }
        }
        report
    }

    /// `Ok(false)` when nothing is open to sanitize.
    pub fn remove<H: Host + ?Sized>(
        &self,
        host: &mut H,
        doc: DocumentId,
        kind: MetadataKind,
    ) -> Result<bool, MetadataError> {
        if host.open_documents() == 0 {
            return Ok(false);
        }
        host.strip_metadata(doc, kind)
            .map(|_| true)
            .map_err(|source| MetadataError { kind, source })
    }
}
