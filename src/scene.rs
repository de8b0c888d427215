//! Scene descriptions
//!
//! JSON documents loaded into the in-memory host. PNG paths are relative to
//! the description file.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::{BitDepth, ColorMode};
use crate::memory::{ColorProfile, Layer, MemoryDocument, Rect};
use crate::xmp::XmpPacket;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scene description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 in {field}: {source}")]
    Base64 {
        field: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Layer '{layer}' has an unreadable image: {source}")]
    Image {
        layer: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Layer '{layer}': {message}")]
    Layer { layer: String, message: &'static str },
}

fn default_mode() -> ColorMode {
    ColorMode::Rgb
}

fn default_depth() -> BitDepth {
    BitDepth::Eight
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescription {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_mode")]
    pub mode: ColorMode,
    #[serde(default = "default_depth")]
    pub bit_depth: BitDepth,
    #[serde(default)]
    pub profile: Option<ProfileDescription>,
    #[serde(default)]
    pub xmp: XmpPacket,
    #[serde(default)]
    pub exif_base64: Option<String>,
    /// Top of the stack first
    #[serde(default)]
    pub layers: Vec<LayerDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDescription {
    pub name: String,
    #[serde(default)]
    pub icc_base64: Option<String>,
}

/// One layer. Exactly one of `artboard`, `children`, `fill`, `png` or
/// `pngBase64` decides its kind, checked in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescription {
    pub name: String,
    #[serde(default)]
    pub artboard: Option<Rect>,
    #[serde(default)]
    pub children: Option<Vec<LayerDescription>>,
    #[serde(default)]
    pub fill: Option<[u8; 4]>,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub png: Option<PathBuf>,
    #[serde(default)]
    pub png_base64: Option<String>,
    /// Offset of raster content
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

fn decode(field: &str, data: &str) -> Result<Vec<u8>, SceneError> {
    STANDARD.decode(data.trim()).map_err(|source| SceneError::Base64 {
        field: field.to_string(),
        source,
    })
}

impl DocumentDescription {
    pub fn from_json(content: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Builds the document, resolving PNG paths against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<MemoryDocument, SceneError> {
        let profile = match &self.profile {
            Some(p) => ColorProfile {
                name: p.name.clone(),
                icc: p.icc_base64.as_deref().map(|d| decode("profile.iccBase64", d)).transpose()?,
            },
            None => ColorProfile::default(),
        };

        let mut document = MemoryDocument::new(self.name.clone(), self.width, self.height)
            .with_mode(self.mode)
            .with_bit_depth(self.bit_depth)
            .with_profile(profile)
            .with_xmp(self.xmp.clone());
        if let Some(exif) = &self.exif_base64 {
            document = document.with_exif(decode("exifBase64", exif)?);
        }
        for layer in &self.layers {
            document = document.with_layer(layer.build(base_dir)?);
        }
        Ok(document)
    }
}

impl LayerDescription {
    fn build(&self, base_dir: &Path) -> Result<Layer, SceneError> {
        let children = |list: &[LayerDescription]| -> Result<Vec<Layer>, SceneError> {
            list.iter().map(|child| child.build(base_dir)).collect()
        };

        if let Some(rect) = self.artboard {
            return Ok(Layer::artboard(
                self.name.clone(),
                rect,
                children(self.children.as_deref().unwrap_or_default())?,
            ));
        }
        if let Some(list) = &self.children {
            return Ok(Layer::group(self.name.clone(), children(list)?));
        }
        if let Some(rgba) = self.fill {
            let rect = self.rect.ok_or_else(|| self.invalid("fill requires a rect"))?;
            return Ok(Layer::fill(self.name.clone(), rect, rgba));
        }

        let bytes = if let Some(path) = &self.png {
            let path = base_dir.join(path);
            fs::read(&path).map_err(|source| SceneError::Io { path, source })?
        } else if let Some(data) = &self.png_base64 {
            decode(&format!("layer '{}'", self.name), data)?
        } else {
            return Err(self.invalid("layer has no content"));
        };
        let image = image::load_from_memory(&bytes)
            .map_err(|source| SceneError::Image {
                layer: self.name.clone(),
                source,
            })?
            .to_rgba8();
        Ok(Layer::pixels(self.name.clone(), self.x, self.y, image))
    }

    fn invalid(&self, message: &'static str) -> SceneError {
        SceneError::Layer {
            layer: self.name.clone(),
            message,
        }
    }
}

/// Reads and builds the description at `path`.
pub fn load_scene(path: &Path) -> Result<MemoryDocument, SceneError> {
    let content = fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    DocumentDescription::from_json(&content)?.build(base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LayerContent;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    const SCENE: &str = r#"{
        "name": "Poster.psd",
        "width": 300,
        "height": 100,
        "mode": "cmyk",
        "bitDepth": "16",
        "profile": {"name": "Coated FOGRA39", "iccBase64": "AAEC"},
        "xmp": {"http://ns.adobe.com/photoshop/1.0/": {"DocumentAncestors": "xmp.did:1"}},
        "layers": [
            {"name": "Hero", "artboard": {"x": 0, "y": 0, "width": 100, "height": 100},
             "children": [{"name": "Bg", "fill": [255, 0, 0, 255], "rect": {"x": 0, "y": 0, "width": 100, "height": 100}}]},
            {"name": "Loose", "children": []}
        ]
    }"#;

    #[test]
    fn test_builds_document() {
        let document = DocumentDescription::from_json(SCENE).unwrap().build(Path::new(".")).unwrap();
        assert_eq!(document.mode, ColorMode::Cmyk);
        assert_eq!(document.bit_depth, BitDepth::Sixteen);
        assert_eq!(document.profile.icc, Some(vec![0, 1, 2]));
        assert_eq!(document.layers.len(), 2);
        assert!(document.layers[0].is_artboard());
        assert!(document.layers[1].is_group() && !document.layers[1].is_artboard());
    }

    #[test]
    fn test_png_layers_from_file_and_base64() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tile.png"), &png).unwrap();
        let scene = serde_json::json!({
            "name": "Tiles.psd", "width": 10, "height": 10,
            "layers": [
                {"name": "File", "png": "tile.png", "x": 4},
                {"name": "Inline", "pngBase64": STANDARD.encode(&png)}
            ]
        });
        let path = dir.path().join("scene.json");
        fs::write(&path, scene.to_string()).unwrap();

        let document = load_scene(&path).unwrap();
        match &document.layers[0].content {
            LayerContent::Pixels { x, image, .. } => {
                assert_eq!(*x, 4);
                assert_eq!(image.dimensions(), (3, 2));
            }
            other => panic!("unexpected content {:?}", other),
        }
        assert!(matches!(document.layers[1].content, LayerContent::Pixels { .. }));
    }

    #[test]
    fn test_rejects_layer_without_content() {
        let scene = r#"{"name": "x", "width": 1, "height": 1, "layers": [{"name": "Empty"}]}"#;
        let err = DocumentDescription::from_json(scene).unwrap().build(Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::Layer { .. }));
    }
}
