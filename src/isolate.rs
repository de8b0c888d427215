//! Layer Isolator
//!
//! Turns one artboard of the master into a standalone flat unit document.
//! A unit that fails part-way is closed before the error is returned.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::enumerate::ArtboardHandle;
use crate::host::{DocumentId, Host, HostError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IsolationStep {
    Select,
    EditContents,
    SelectAll,
    Ungroup,
    Autocrop,
}

impl fmt::Display for IsolationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            IsolationStep::Select => "select",
            IsolationStep::EditContents => "edit contents",
            IsolationStep::SelectAll => "select all",
            IsolationStep::Ungroup => "ungroup",
            IsolationStep::Autocrop => "autocrop",
        };
        f.write_str(step)
    }
}

#[derive(Debug, Error)]
#[error("Isolating artboard {ordinal} ('{name}') failed at {step}: {source}")]
pub struct IsolationError {
    pub ordinal: usize,
    pub name: String,
    pub step: IsolationStep,
    #[source]
    pub source: HostError,
}

/// A transient single-artboard document. Consumed by [`IsolatedUnit::discard`].
#[derive(Debug)]
pub struct IsolatedUnit {
    document: DocumentId,
    artboard: ArtboardHandle,
    layer_name: String,
}

impl IsolatedUnit {
    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn artboard(&self) -> ArtboardHandle {
        self.artboard
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// Closes the unit without saving.
    pub fn discard<H: Host + ?Sized>(self, host: &mut H) {
        if let Err(e) = host.close_without_saving(self.document) {
            tracing::warn!(document = %self.document, error = %e, "Failed to close isolated unit");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LayerIsolator;

impl LayerIsolator {
    pub fn new() -> Self {
        Self
    }

    pub fn isolate<H: Host + ?Sized>(
        &self,
        host: &mut H,
        master: DocumentId,
        artboard: ArtboardHandle,
    ) -> Result<IsolatedUnit, IsolationError> {
        let fail = |name: &str, step, source| IsolationError {
            ordinal: artboard.ordinal,
            name: name.to_string(),
            step,
            source,
        };

        host.select_layer(master, artboard.layer_index)
            .map_err(|e| fail("", IsolationStep::Select, e))?;
        let layer_name = host
            .active_layer_name(master)
            .map_err(|e| fail("", IsolationStep::Select, e))?;

        let document = host
            .duplicate_and_edit_contents(master)
            .map_err(|e| fail(&layer_name, IsolationStep::EditContents, e))?;

        let unit = IsolatedUnit {
            document,
            artboard,
            layer_name,
        };

        let flattened = host
            .select_all(document)
            .map_err(|e| (IsolationStep::SelectAll, e))
            .and_then(|_| host.ungroup(document).map_err(|e| (IsolationStep::Ungroup, e)))
            .and_then(|_| host.autocrop(document).map_err(|e| (IsolationStep::Autocrop, e)));

        match flattened {
            Ok(()) => Ok(unit),
            Err((step, e)) => {
                let error = fail(&unit.layer_name, step, e);
                unit.discard(host);
                Err(error)
            }
        }
    }
}
