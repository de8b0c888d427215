//! Artboard Enumerator
//!
//! Captures the artboard snapshot once, before any mutation.

use serde::Serialize;
use thiserror::Error;

use crate::host::{DocumentId, Host, HostError, LayerIndex};

#[derive(Debug, Error)]
#[error("Artboard query on {document} failed: {source}")]
pub struct EnumerationError {
    pub document: DocumentId,
    #[source]
    pub source: HostError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtboardHandle {
    /// Position in enumeration order
    pub ordinal: usize,
    pub layer_index: LayerIndex,
}

pub fn enumerate_artboards<H: Host + ?Sized>(
    host: &H,
    doc: DocumentId,
) -> Result<Vec<ArtboardHandle>, EnumerationError> {
    let indices = host
        .enumerate_artboards(doc)
        .map_err(|source| EnumerationError { document: doc, source })?;

    Ok(indices
        .into_iter()
        .enumerate()
        .map(|(ordinal, layer_index)| ArtboardHandle { ordinal, layer_index })
        .collect())
}
