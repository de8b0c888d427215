//! Host Capability Interface
//!
//! The narrow set of editor operations the export pipeline drives.
//! Every operation names its target document explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::export::{JpegExportOptions, WebPExportOptions};

/// Handle to an open document inside a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u32);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Position of a top-level layer in a document's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerIndex(pub usize);

/// Opaque token for a captured document state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    pub document: DocumentId,
    pub id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Rgb,
    Cmyk,
    Grayscale,
    Lab,
    Indexed,
    Bitmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "16")]
    Sixteen,
    #[serde(rename = "32")]
    ThirtyTwo,
}

impl BitDepth {
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::One => 1,
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::ThirtyTwo => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderingIntent {
    Perceptual,
    Saturation,
    RelativeColorimetric,
    AbsoluteColorimetric,
}

/// Arguments of a color profile conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConversion {
    pub profile: String,
    pub intent: RenderingIntent,
    pub black_point_compensation: bool,
    pub dither: bool,
}

/// Metadata classes the sanitizer can remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataKind {
    /// Every embedded descriptive property.
    Descriptive,
    /// The camera raw settings namespace only.
    CameraRaw,
    /// The `photoshop:DocumentAncestors` property.
    DocumentAncestors,
}

/// Read-only view of a document's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub mode: ColorMode,
    pub bit_depth: BitDepth,
    pub profile: String,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("No such document: {0}")]
    NoSuchDocument(DocumentId),

    #[error("No layer at index {index} in {document}")]
    NoSuchLayer { document: DocumentId, index: usize },

    #[error("No active layer in {0}")]
    NoActiveLayer(DocumentId),

    #[error("Layer '{0}' is not a group")]
    NotAGroup(String),

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    #[error("{op} failed: {message}")]
    Operation { op: &'static str, message: String },

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn operation(op: &'static str, message: impl Into<String>) -> Self {
        HostError::Operation { op, message: message.into() }
    }
}

/// Capability interface over an image editor's document model.
///
/// Calls are synchronous and block until the host completes them. A host is
/// driven by one caller at a time.
pub trait Host {
    /// Application version string, e.g. `"25.0.1"`.
    fn version(&self) -> &str;

    fn active_document(&self) -> Option<DocumentId>;

    fn open_documents(&self) -> usize;

    fn document_info(&self, doc: DocumentId) -> Result<DocumentInfo, HostError>;

    /// Duplicates `doc` layers and all under a new name and returns the copy.
    fn duplicate_document(&mut self, doc: DocumentId, name: &str) -> Result<DocumentId, HostError>;

    /// Stack indices of the top-level artboards, in stack order.
    fn enumerate_artboards(&self, doc: DocumentId) -> Result<Vec<LayerIndex>, HostError>;

    /// Makes the layer at `index` the only selected layer.
    fn select_layer(&mut self, doc: DocumentId, index: LayerIndex) -> Result<(), HostError>;

    fn active_layer_name(&self, doc: DocumentId) -> Result<String, HostError>;

    /// Converts the selected layer into a placed unit and opens its contents
    /// as a separate document, which is returned.
    fn duplicate_and_edit_contents(&mut self, doc: DocumentId) -> Result<DocumentId, HostError>;

    fn select_all(&mut self, doc: DocumentId) -> Result<(), HostError>;

    fn ungroup(&mut self, doc: DocumentId) -> Result<(), HostError>;

    /// Trims the canvas to its non-transparent content.
    fn autocrop(&mut self, doc: DocumentId) -> Result<(), HostError>;

    fn convert_color_profile(
        &mut self,
        doc: DocumentId,
        conversion: &ProfileConversion,
    ) -> Result<(), HostError>;

    fn set_mode(&mut self, doc: DocumentId, mode: ColorMode) -> Result<(), HostError>;

    fn set_bit_depth(&mut self, doc: DocumentId, depth: BitDepth) -> Result<(), HostError>;

    fn strip_metadata(&mut self, doc: DocumentId, kind: MetadataKind) -> Result<(), HostError>;

    /// Writes `doc` as WebP, returning the number of bytes written.
    fn export_webp(
        &mut self,
        doc: DocumentId,
        path: &Path,
        options: &WebPExportOptions,
    ) -> Result<u64, HostError>;

    /// Writes `doc` as JPEG, returning the number of bytes written.
    fn export_jpeg(
        &mut self,
        doc: DocumentId,
        path: &Path,
        options: &JpegExportOptions,
    ) -> Result<u64, HostError>;

    fn begin_checkpoint(&mut self, doc: DocumentId) -> Result<Checkpoint, HostError>;

    /// Reverts the checkpoint's document to the captured state.
    fn restore(&mut self, checkpoint: Checkpoint) -> Result<(), HostError>;

    fn close_without_saving(&mut self, doc: DocumentId) -> Result<(), HostError>;
}
