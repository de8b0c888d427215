//! In-Memory Reference Host
//!
//! Implements [`Host`] over [`MemoryDocument`]s. Exports are real files:
//! lossy WebP through libwebp, baseline JPEG through `image`.
//!
//! Every mutating call is appended to a call log, and failures can be
//! injected per operation.

pub mod document;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{self, WebPMetadata};
use crate::export::{Codec, JpegExportOptions, WebPCompression, WebPExportOptions};
use crate::host::{
    BitDepth, Checkpoint, ColorMode, DocumentId, DocumentInfo, Host, HostError, LayerIndex,
    MetadataKind, ProfileConversion,
};
use crate::xmp::{DOCUMENT_ANCESTORS, NS_CAMERA_RAW, NS_PHOTOSHOP};

pub use document::{flatten, ColorProfile, Layer, LayerContent, MemoryDocument, Rect};

/// Operations recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    DuplicateDocument(DocumentId),
    SelectLayer(DocumentId, LayerIndex),
    EditContents(DocumentId),
    SelectAll(DocumentId),
    Ungroup(DocumentId),
    Autocrop(DocumentId),
    ConvertProfile(DocumentId, String),
    SetMode(DocumentId, ColorMode),
    SetBitDepth(DocumentId, BitDepth),
    StripMetadata(DocumentId, MetadataKind),
    ExportWebP(DocumentId, PathBuf),
    ExportJpeg(DocumentId, PathBuf),
    BeginCheckpoint(DocumentId),
    Restore(DocumentId),
    Close(DocumentId),
}

/// Injected failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Ungrouping fails when the active group has this name.
    Ungroup { layer: String },
    /// Writes of `codec` fail when the file stem contains `name`.
    Export { codec: Codec, name: String },
    /// The artboard query fails.
    Enumerate,
}

/// Host quality (0-12) to encoder quality (1-100).
pub fn jpeg_encoder_quality(host_quality: u8) -> u8 {
    let q = host_quality.min(12) as u32;
    ((q * 100 + 6) / 12).max(1) as u8
}

pub struct MemoryHost {
    version: String,
    documents: BTreeMap<DocumentId, MemoryDocument>,
    /// Open order; the last entry is active
    order: Vec<DocumentId>,
    next_document: u32,
    checkpoints: HashMap<u64, (DocumentId, MemoryDocument)>,
    next_checkpoint: u64,
    metadata_available: bool,
    faults: Vec<Fault>,
    calls: Vec<HostCall>,
}

impl MemoryHost {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            documents: BTreeMap::new(),
            order: vec![],
            next_document: 1,
            checkpoints: HashMap::new(),
            next_checkpoint: 1,
            metadata_available: true,
            faults: vec![],
            calls: vec![],
        }
    }

    /// Opens `document` and makes it active.
    pub fn open(&mut self, document: MemoryDocument) -> DocumentId {
        let id = DocumentId(self.next_document);
        self.next_document += 1;
        self.documents.insert(id, document);
        self.order.push(id);
        id
    }

    pub fn document(&self, id: DocumentId) -> Option<&MemoryDocument> {
        self.documents.get(&id)
    }

    pub fn is_open(&self, id: DocumentId) -> bool {
        self.documents.contains_key(&id)
    }

    pub fn inject(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    pub fn set_metadata_available(&mut self, available: bool) {
        self.metadata_available = available;
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn count_calls(&self, matches: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.iter().filter(|c| matches(c)).count()
    }

    fn doc(&self, id: DocumentId) -> Result<&MemoryDocument, HostError> {
        self.documents.get(&id).ok_or(HostError::NoSuchDocument(id))
    }

    fn doc_mut(&mut self, id: DocumentId) -> Result<&mut MemoryDocument, HostError> {
        self.documents.get_mut(&id).ok_or(HostError::NoSuchDocument(id))
    }

    fn export_fault(&self, codec: Codec, path: &Path) -> Option<HostError> {
        let stem = path.file_stem()?.to_string_lossy();
        self.faults.iter().find_map(|fault| match fault {
            Fault::Export { codec: c, name } if *c == codec && stem.contains(name.as_str()) => {
                Some(HostError::operation("save", format!("injected {} failure", codec.label())))
            }
            _ => None,
        })
    }

    fn prepare_export(&self, doc: DocumentId, codec: Codec, path: &Path) -> Result<&MemoryDocument, HostError> {
        if let Some(e) = self.export_fault(codec, path) {
            return Err(e);
        }
        let document = self.doc(doc)?;
        if document.width == 0 || document.height == 0 {
            return Err(HostError::operation("save", "document has an empty canvas"));
        }
        Ok(document)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(crate::MIN_HOST_VERSION)
    }
}

impl Host for MemoryHost {
    fn version(&self) -> &str {
        &self.version
    }

    fn active_document(&self) -> Option<DocumentId> {
        self.order.last().copied()
    }

    fn open_documents(&self) -> usize {
        self.documents.len()
    }

    fn document_info(&self, doc: DocumentId) -> Result<DocumentInfo, HostError> {
        let document = self.doc(doc)?;
        Ok(DocumentInfo {
            name: document.name.clone(),
            mode: document.mode,
            bit_depth: document.bit_depth,
            profile: document.profile.name.clone(),
        })
    }

    fn duplicate_document(&mut self, doc: DocumentId, name: &str) -> Result<DocumentId, HostError> {
        let mut copy = self.doc(doc)?.clone();
        copy.name = name.to_string();
        copy.history = 1;
        self.calls.push(HostCall::DuplicateDocument(doc));
        Ok(self.open(copy))
    }

    fn enumerate_artboards(&self, doc: DocumentId) -> Result<Vec<LayerIndex>, HostError> {
        if self.faults.contains(&Fault::Enumerate) {
            return Err(HostError::operation("get artboards", "artboard list unavailable"));
        }
        Ok(self
            .doc(doc)?
            .layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.is_artboard())
            .map(|(i, _)| LayerIndex(i))
            .collect())
    }

    fn select_layer(&mut self, doc: DocumentId, index: LayerIndex) -> Result<(), HostError> {
        let document = self.doc_mut(doc)?;
        if index.0 >= document.layers.len() {
            return Err(HostError::NoSuchLayer { document: doc, index: index.0 });
        }
        document.active_layer = Some(index.0);
        self.calls.push(HostCall::SelectLayer(doc, index));
        Ok(())
    }

    fn active_layer_name(&self, doc: DocumentId) -> Result<String, HostError> {
        let document = self.doc(doc)?;
        document
            .active_layer
            .and_then(|i| document.layers.get(i))
            .map(|layer| layer.name.clone())
            .ok_or(HostError::NoActiveLayer(doc))
    }

    fn duplicate_and_edit_contents(&mut self, doc: DocumentId) -> Result<DocumentId, HostError> {
        let master = self.doc_mut(doc)?;
        let index = master
            .active_layer
            .filter(|i| *i < master.layers.len())
            .ok_or(HostError::NoActiveLayer(doc))?;

        let source = match &master.layers[index].content {
            LayerContent::Placed { source } => (**source).clone(),
            _ => {
                let layer = master.layers[index].clone();
                master.layers[index] = Layer {
                    name: layer.name.clone(),
                    content: LayerContent::Placed { source: Box::new(layer.clone()) },
                };
                master.history += 1;
                layer
            }
        };

        let canvas = match &source.content {
            LayerContent::Group { artboard: Some(rect), .. } => *rect,
            _ => master.canvas(),
        };
        if canvas.is_empty() {
            return Err(HostError::operation("edit contents", "artboard has no area"));
        }

        let mut contents = source.clone();
        if let LayerContent::Group { artboard, .. } = &mut contents.content {
            *artboard = None;
        }
        contents.translate(-canvas.x, -canvas.y);

        let mut unit = MemoryDocument::new(format!("{}.psb", source.name), canvas.width, canvas.height)
            .with_mode(master.mode)
            .with_bit_depth(master.bit_depth)
            .with_profile(master.profile.clone())
            .with_xmp(master.xmp.clone())
            .with_layer(contents);
        unit.exif = master.exif.clone();
        unit.active_layer = Some(0);

        self.calls.push(HostCall::EditContents(doc));
        Ok(self.open(unit))
    }

    fn select_all(&mut self, doc: DocumentId) -> Result<(), HostError> {
        let document = self.doc_mut(doc)?;
        document.selection = Some(document.canvas());
        document.history += 1;
        self.calls.push(HostCall::SelectAll(doc));
        Ok(())
    }

    fn ungroup(&mut self, doc: DocumentId) -> Result<(), HostError> {
        self.calls.push(HostCall::Ungroup(doc));
        let active_name = self.active_layer_name(doc)?;
        let injected = self
            .faults
            .iter()
            .any(|fault| matches!(fault, Fault::Ungroup { layer } if *layer == active_name));
        if injected {
            return Err(HostError::operation("ungroup layers", "injected failure"));
        }

        let document = self.doc_mut(doc)?;
        let index = document.active_layer.ok_or(HostError::NoActiveLayer(doc))?;
        if !document.layers[index].is_group() {
            return Err(HostError::NotAGroup(active_name));
        }

        let mut below = document.layers.split_off(index);
        let children = flatten(vec![below.remove(0)]);
        let count = children.len();
        document.layers.extend(children);
        document.layers.extend(below);
        document.active_layer = if count > 0 { Some(index) } else { None };
        document.history += 1;
        Ok(())
    }

    fn autocrop(&mut self, doc: DocumentId) -> Result<(), HostError> {
        let document = self.doc_mut(doc)?;
        if let Some(bounds) = document.content_bounds() {
            if bounds != document.canvas() {
                document.crop_to(bounds);
            }
            document.history += 1;
        }
        self.calls.push(HostCall::Autocrop(doc));
        Ok(())
    }

    fn convert_color_profile(
        &mut self,
        doc: DocumentId,
        conversion: &ProfileConversion,
    ) -> Result<(), HostError> {
        let document = self.doc_mut(doc)?;
        document.profile = ColorProfile::named(conversion.profile.clone());
        document.mode = ColorMode::Rgb;
        document.history += 1;
        self.calls.push(HostCall::ConvertProfile(doc, conversion.profile.clone()));
        Ok(())
    }

    fn set_mode(&mut self, doc: DocumentId, mode: ColorMode) -> Result<(), HostError> {
        let document = self.doc_mut(doc)?;
        if document.mode != mode {
            document.mode = mode;
            document.history += 1;
        }
        self.calls.push(HostCall::SetMode(doc, mode));
        Ok(())
    }

    fn set_bit_depth(&mut self, doc: DocumentId, depth: BitDepth) -> Result<(), HostError> {
        let document = self.doc_mut(doc)?;
        if document.bit_depth != depth {
            document.bit_depth = depth;
            document.history += 1;
        }
        self.calls.push(HostCall::SetBitDepth(doc, depth));
        Ok(())
    }

    fn strip_metadata(&mut self, doc: DocumentId, kind: MetadataKind) -> Result<(), HostError> {
        if !self.metadata_available {
            return Err(HostError::Unsupported("XMP metadata subsystem"));
        }
        let document = self.doc_mut(doc)?;
        match kind {
            MetadataKind::Descriptive => {
                document.xmp.remove_all();
                document.exif = None;
            }
            MetadataKind::CameraRaw => document.xmp.remove_namespace(NS_CAMERA_RAW),
            MetadataKind::DocumentAncestors => {
                document.xmp.delete_property(NS_PHOTOSHOP, DOCUMENT_ANCESTORS)
            }
        }
        self.calls.push(HostCall::StripMetadata(doc, kind));
        Ok(())
    }

    fn export_webp(
        &mut self,
        doc: DocumentId,
        path: &Path,
        options: &WebPExportOptions,
    ) -> Result<u64, HostError> {
        let document = self.prepare_export(doc, Codec::WebP, path)?;
        let rgba = document.composite();

        let lossless = options.compression == WebPCompression::Lossless;
        let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
            .encode_simple(lossless, options.quality.min(100) as f32)
            .map_err(|e| HostError::Encode(format!("{:?}", e)))?;

        let xmp = if options.include_xmp && !document.xmp.is_empty() {
            Some(document.xmp.to_xml().map_err(|e| HostError::Encode(e.to_string()))?)
        } else {
            None
        };
        let metadata = WebPMetadata {
            icc: document.profile.icc.as_deref().filter(|_| options.include_extras),
            exif: document.exif.as_deref().filter(|_| options.include_exif),
            xmp: xmp.as_deref(),
        };
        let bytes = codec::wrap_extended(&encoded, rgba.width(), rgba.height(), &metadata)
            .map_err(|e| HostError::Encode(e.to_string()))?;

        fs::write(path, &bytes)?;
        self.calls.push(HostCall::ExportWebP(doc, path.to_path_buf()));
        Ok(bytes.len() as u64)
    }

    fn export_jpeg(
        &mut self,
        doc: DocumentId,
        path: &Path,
        options: &JpegExportOptions,
    ) -> Result<u64, HostError> {
        let document = self.prepare_export(doc, Codec::Jpeg, path)?;
        // No matte: alpha is dropped, not composited
        let rgb = DynamicImage::ImageRgba8(document.composite()).to_rgb8();

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, jpeg_encoder_quality(options.quality))
            .encode_image(&rgb)
            .map_err(|e| HostError::Encode(e.to_string()))?;

        let bytes = match (&document.profile.icc, options.embed_color_profile) {
            (Some(icc), true) => codec::embed_icc_profile(&encoded, icc)
                .map_err(|e| HostError::Encode(e.to_string()))?,
            _ => encoded,
        };

        fs::write(path, &bytes)?;
        self.calls.push(HostCall::ExportJpeg(doc, path.to_path_buf()));
        Ok(bytes.len() as u64)
    }

    fn begin_checkpoint(&mut self, doc: DocumentId) -> Result<Checkpoint, HostError> {
        let snapshot = self.doc(doc)?.clone();
        let id = self.next_checkpoint;
        self.next_checkpoint += 1;
        self.checkpoints.insert(id, (doc, snapshot));
        self.calls.push(HostCall::BeginCheckpoint(doc));
        Ok(Checkpoint { document: doc, id })
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> Result<(), HostError> {
        let (doc, snapshot) = self
            .checkpoints
            .remove(&checkpoint.id)
            .filter(|(doc, _)| *doc == checkpoint.document)
            .ok_or_else(|| HostError::operation("restore", format!("unknown checkpoint {}", checkpoint.id)))?;
        *self.doc_mut(doc)? = snapshot;
        self.calls.push(HostCall::Restore(doc));
        Ok(())
    }

    fn close_without_saving(&mut self, doc: DocumentId) -> Result<(), HostError> {
        self.documents.remove(&doc).ok_or(HostError::NoSuchDocument(doc))?;
        self.order.retain(|id| *id != doc);
        self.checkpoints.retain(|_, (owner, _)| *owner != doc);
        self.calls.push(HostCall::Close(doc));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmp::XmpPacket;

    fn poster() -> MemoryDocument {
        MemoryDocument::new("Poster.psd", 400, 200)
            .with_layer(Layer::artboard(
                "Left",
                Rect::new(0, 0, 200, 200),
                vec![Layer::group(
                    "Content",
                    vec![Layer::fill("Square", Rect::new(50, 50, 100, 100), [255, 0, 0, 255])],
                )],
            ))
            .with_layer(Layer::artboard(
                "Right",
                Rect::new(200, 0, 200, 200),
                vec![Layer::fill("Bg", Rect::new(200, 0, 200, 200), [0, 0, 255, 255])],
            ))
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_encoder_quality(12), 100);
        assert_eq!(jpeg_encoder_quality(6), 50);
        assert_eq!(jpeg_encoder_quality(0), 1);
        assert_eq!(jpeg_encoder_quality(200), 100);
    }

    #[test]
    fn test_enumerate_lists_artboards_in_stack_order() {
        let mut host = MemoryHost::default();
        let doc = host.open(poster().with_layer(Layer::fill("Loose", Rect::new(0, 0, 1, 1), [0, 0, 0, 255])));
        assert_eq!(host.enumerate_artboards(doc).unwrap(), vec![LayerIndex(0), LayerIndex(1)]);
    }

    #[test]
    fn test_edit_contents_places_layer_and_opens_unit() {
        let mut host = MemoryHost::default();
        let doc = host.open(poster());
        host.select_layer(doc, LayerIndex(1)).unwrap();
        let unit = host.duplicate_and_edit_contents(doc).unwrap();

        assert!(matches!(host.document(doc).unwrap().layers[1].content, LayerContent::Placed { .. }));
        let unit_doc = host.document(unit).unwrap();
        assert_eq!(unit_doc.name, "Right.psb");
        assert_eq!((unit_doc.width, unit_doc.height), (200, 200));
        assert_eq!(host.active_document(), Some(unit));
    }

    #[test]
    fn test_ungroup_and_autocrop_produce_flat_trimmed_unit() {
        let mut host = MemoryHost::default();
        let doc = host.open(poster());
        host.select_layer(doc, LayerIndex(0)).unwrap();
        let unit = host.duplicate_and_edit_contents(doc).unwrap();
        host.select_all(unit).unwrap();
        host.ungroup(unit).unwrap();
        host.autocrop(unit).unwrap();

        let unit_doc = host.document(unit).unwrap();
        assert!(unit_doc.layers.iter().all(|l| !l.is_group()));
        assert_eq!((unit_doc.width, unit_doc.height), (100, 100));
    }

    #[test]
    fn test_ungroup_requires_group() {
        let mut host = MemoryHost::default();
        let doc = host.open(
            MemoryDocument::new("flat.psd", 10, 10)
                .with_layer(Layer::fill("Only", Rect::new(0, 0, 10, 10), [0, 0, 0, 255])),
        );
        host.select_layer(doc, LayerIndex(0)).unwrap();
        assert!(matches!(host.ungroup(doc), Err(HostError::NotAGroup(_))));
    }

    #[test]
    fn test_restore_reverts_structure() {
        let mut host = MemoryHost::default();
        let doc = host.open(poster());
        let before = host.document(doc).unwrap().clone();

        let checkpoint = host.begin_checkpoint(doc).unwrap();
        host.select_layer(doc, LayerIndex(0)).unwrap();
        let unit = host.duplicate_and_edit_contents(doc).unwrap();
        host.close_without_saving(unit).unwrap();
        assert_ne!(host.document(doc).unwrap(), &before);

        host.restore(checkpoint).unwrap();
        assert_eq!(host.document(doc).unwrap(), &before);
        assert!(host.restore(checkpoint).is_err());
    }

    #[test]
    fn test_strip_metadata_kinds() {
        let mut xmp = XmpPacket::new();
        xmp.set(NS_PHOTOSHOP, DOCUMENT_ANCESTORS, "x");
        xmp.set(NS_PHOTOSHOP, "ColorMode", "3");
        xmp.set(NS_CAMERA_RAW, "Exposure2012", "0");

        let mut host = MemoryHost::default();
        let doc = host.open(MemoryDocument::new("d.psd", 1, 1).with_xmp(xmp));
        host.strip_metadata(doc, MetadataKind::DocumentAncestors).unwrap();
        host.strip_metadata(doc, MetadataKind::CameraRaw).unwrap();
        let xmp = &host.document(doc).unwrap().xmp;
        assert_eq!(xmp.get(NS_PHOTOSHOP, DOCUMENT_ANCESTORS), None);
        assert!(!xmp.has_namespace(NS_CAMERA_RAW));
        assert_eq!(xmp.get(NS_PHOTOSHOP, "ColorMode"), Some("3"));

        host.strip_metadata(doc, MetadataKind::Descriptive).unwrap();
        assert!(host.document(doc).unwrap().xmp.is_empty());

        host.set_metadata_available(false);
        assert!(matches!(
            host.strip_metadata(doc, MetadataKind::Descriptive),
            Err(HostError::Unsupported(_))
        ));
    }

    #[test]
    fn test_exports_write_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut xmp = XmpPacket::new();
        xmp.set(NS_PHOTOSHOP, "ColorMode", "3");
        let mut host = MemoryHost::default();
        let doc = host.open(
            MemoryDocument::new("d.psd", 8, 8)
                .with_profile(ColorProfile { name: "Test".into(), icc: Some(vec![1, 2, 3, 4]) })
                .with_xmp(xmp)
                .with_layer(Layer::fill("Fill", Rect::new(0, 0, 8, 8), [10, 20, 30, 255])),
        );

        let webp_path = dir.path().join("d.webp");
        let written = host.export_webp(doc, &webp_path, &WebPExportOptions::default()).unwrap();
        let webp = fs::read(&webp_path).unwrap();
        assert_eq!(webp.len() as u64, written);
        let fourccs: Vec<_> = codec::webp::parse_chunks(&webp)
            .unwrap()
            .iter()
            .map(|c| c.fourcc)
            .collect();
        assert_eq!(fourccs.first(), Some(b"VP8X"));
        assert!(fourccs.contains(b"ICCP"));
        assert!(fourccs.contains(b"XMP "));

        let jpeg_path = dir.path().join("d.jpg");
        host.export_jpeg(doc, &jpeg_path, &JpegExportOptions::default()).unwrap();
        let jpeg = fs::read(&jpeg_path).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert!(jpeg.windows(12).any(|w| w == b"ICC_PROFILE\0"));
    }

    #[test]
    fn test_webp_profile_chunk_follows_extras_option() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::default();
        let doc = host.open(
            MemoryDocument::new("d.psd", 4, 4)
                .with_profile(ColorProfile { name: "Test".into(), icc: Some(vec![9, 9, 9]) })
                .with_exif(b"Exif\0\0cam".to_vec())
                .with_layer(Layer::fill("Fill", Rect::new(0, 0, 4, 4), [0, 0, 0, 255])),
        );

        let path = dir.path().join("plain.webp");
        let options = WebPExportOptions { include_extras: false, ..WebPExportOptions::default() };
        host.export_webp(doc, &path, &options).unwrap();
        let webp = fs::read(&path).unwrap();
        let fourccs: Vec<_> = codec::webp::parse_chunks(&webp)
            .unwrap()
            .iter()
            .map(|c| c.fourcc)
            .collect();
        assert!(!fourccs.contains(b"ICCP"));
        assert!(fourccs.contains(b"EXIF"));
    }

    #[test]
    fn test_injected_export_fault() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::default();
        let doc = host.open(
            MemoryDocument::new("d.psd", 2, 2)
                .with_layer(Layer::fill("Fill", Rect::new(0, 0, 2, 2), [0, 0, 0, 255])),
        );
        host.inject(Fault::Export { codec: Codec::Jpeg, name: "Bad".into() });
        let path = dir.path().join("Bad one.jpg");
        assert!(host.export_jpeg(doc, &path, &JpegExportOptions::default()).is_err());
        assert!(!path.exists());
        assert!(host.export_webp(doc, &dir.path().join("Bad one.webp"), &WebPExportOptions::default()).is_ok());
    }
}
