//! Document model for the in-memory host
//!
//! Pixel data is an 8-bit RGBA rendition regardless of document mode. All
//! layer offsets are in document (canvas) coordinates.

use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::host::{BitDepth, ColorMode};
use crate::xmp::XmpPacket;
use crate::color::CANONICAL_PROFILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x as i64 || bottom <= y as i64 {
            return None;
        }
        Some(Rect::new(x, y, (right - x as i64) as u32, (bottom - y as i64) as u32))
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, (right - x as i64) as u32, (bottom - y as i64) as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorProfile {
    pub name: String,
    pub icc: Option<Vec<u8>>,
}

impl ColorProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), icc: None }
    }
}

impl Default for ColorProfile {
    fn default() -> Self {
        Self::named(CANONICAL_PROFILE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerContent {
    Pixels { x: i32, y: i32, image: RgbaImage },
    Group { children: Vec<Layer>, artboard: Option<Rect> },
    /// Smart object wrapping the layer it was created from
    Placed { source: Box<Layer> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub content: LayerContent,
}

impl Layer {
    pub fn pixels(name: impl Into<String>, x: i32, y: i32, image: RgbaImage) -> Self {
        Self {
            name: name.into(),
            content: LayerContent::Pixels { x, y, image },
        }
    }

    /// Solid rectangle of `rgba`.
    pub fn fill(name: impl Into<String>, rect: Rect, rgba: [u8; 4]) -> Self {
        let image = RgbaImage::from_pixel(rect.width, rect.height, image::Rgba(rgba));
        Self::pixels(name, rect.x, rect.y, image)
    }

    pub fn group(name: impl Into<String>, children: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            content: LayerContent::Group { children, artboard: None },
        }
    }

    pub fn artboard(name: impl Into<String>, rect: Rect, children: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            content: LayerContent::Group { children, artboard: Some(rect) },
        }
    }

    pub fn is_artboard(&self) -> bool {
        matches!(self.content, LayerContent::Group { artboard: Some(_), .. })
    }

    pub fn is_group(&self) -> bool {
        matches!(self.content, LayerContent::Group { .. })
    }

    /// Bounds of pixels with non-zero alpha.
    pub fn opaque_bounds(&self) -> Option<Rect> {
        match &self.content {
            LayerContent::Pixels { x, y, image } => {
                let mut bounds: Option<(u32, u32, u32, u32)> = None;
                for (px, py, pixel) in image.enumerate_pixels() {
                    if pixel.0[3] == 0 {
                        continue;
                    }
                    bounds = Some(match bounds {
                        None => (px, py, px, py),
                        Some((x0, y0, x1, y1)) => (x0.min(px), y0.min(py), x1.max(px), y1.max(py)),
                    });
                }
                bounds.map(|(x0, y0, x1, y1)| {
                    Rect::new(*x + x0 as i32, *y + y0 as i32, x1 - x0 + 1, y1 - y0 + 1)
                })
            }
            LayerContent::Group { children, .. } => children
                .iter()
                .filter_map(Layer::opaque_bounds)
                .reduce(|a, b| a.union(&b)),
            LayerContent::Placed { source } => source.opaque_bounds(),
        }
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        match &mut self.content {
            LayerContent::Pixels { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            LayerContent::Group { children, artboard } => {
                if let Some(rect) = artboard {
                    rect.x += dx;
                    rect.y += dy;
                }
                for child in children {
                    child.translate(dx, dy);
                }
            }
            LayerContent::Placed { source } => source.translate(dx, dy),
        }
    }

    /// Deletes pixels outside `canvas`, then moves `canvas`'s origin to 0,0.
    pub fn crop_to(&mut self, canvas: &Rect) {
        match &mut self.content {
            LayerContent::Pixels { x, y, image } => {
                let rect = Rect::new(*x, *y, image.width(), image.height());
                match rect.intersect(canvas) {
                    Some(kept) => {
                        *image = imageops::crop_imm(
                            &*image,
                            (kept.x - *x) as u32,
                            (kept.y - *y) as u32,
                            kept.width,
                            kept.height,
                        )
                        .to_image();
                        *x = kept.x - canvas.x;
                        *y = kept.y - canvas.y;
                    }
                    None => {
                        *image = RgbaImage::new(0, 0);
                        *x = 0;
                        *y = 0;
                    }
                }
            }
            LayerContent::Group { children, artboard } => {
                if let Some(rect) = artboard {
                    rect.x -= canvas.x;
                    rect.y -= canvas.y;
                }
                for child in children {
                    child.crop_to(canvas);
                }
            }
            LayerContent::Placed { source } => source.crop_to(canvas),
        }
    }

    fn draw(&self, canvas: &mut RgbaImage) {
        match &self.content {
            LayerContent::Pixels { x, y, image } => {
                imageops::overlay(canvas, image, *x as i64, *y as i64);
            }
            LayerContent::Group { children, .. } => {
                for child in children.iter().rev() {
                    child.draw(canvas);
                }
            }
            LayerContent::Placed { source } => source.draw(canvas),
        }
    }
}

/// Replaces every group by its children, recursively.
pub fn flatten(layers: Vec<Layer>) -> Vec<Layer> {
    let mut flat = Vec::with_capacity(layers.len());
    for layer in layers {
        match layer.content {
            LayerContent::Group { children, .. } => flat.extend(flatten(children)),
            _ => flat.push(layer),
        }
    }
    flat
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDocument {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mode: ColorMode,
    pub bit_depth: BitDepth,
    pub profile: ColorProfile,
    pub xmp: XmpPacket,
    pub exif: Option<Vec<u8>>,
    /// Top of the stack first
    pub layers: Vec<Layer>,
    pub active_layer: Option<usize>,
    pub selection: Option<Rect>,
    /// Number of history states recorded
    pub history: u64,
}

impl MemoryDocument {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            mode: ColorMode::Rgb,
            bit_depth: BitDepth::Eight,
            profile: ColorProfile::default(),
            xmp: XmpPacket::new(),
            exif: None,
            layers: vec![],
            active_layer: None,
            selection: None,
            history: 1,
        }
    }

    pub fn with_mode(mut self, mode: ColorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_bit_depth(mut self, depth: BitDepth) -> Self {
        self.bit_depth = depth;
        self
    }

    pub fn with_profile(mut self, profile: ColorProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_xmp(mut self, xmp: XmpPacket) -> Self {
        self.xmp = xmp;
        self
    }

    pub fn with_exif(mut self, exif: Vec<u8>) -> Self {
        self.exif = Some(exif);
        self
    }

    /// Adds `layer` below the existing ones.
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn canvas(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Structural fingerprint: names and nesting of the layer stack.
    pub fn layer_outline(&self) -> Vec<String> {
        fn walk(layers: &[Layer], depth: usize, out: &mut Vec<String>) {
            for layer in layers {
                let kind = match &layer.content {
                    LayerContent::Pixels { .. } => "pixels",
                    LayerContent::Group { artboard: Some(_), .. } => "artboard",
                    LayerContent::Group { .. } => "group",
                    LayerContent::Placed { .. } => "placed",
                };
                out.push(format!("{}{} ({})", "  ".repeat(depth), layer.name, kind));
                if let LayerContent::Group { children, .. } = &layer.content {
                    walk(children, depth + 1, out);
                }
            }
        }
        let mut out = vec![];
        walk(&self.layers, 0, &mut out);
        out
    }

    pub fn composite(&self) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.width, self.height);
        for layer in self.layers.iter().rev() {
            layer.draw(&mut canvas);
        }
        canvas
    }

    /// Union of opaque content clipped to the canvas.
    pub fn content_bounds(&self) -> Option<Rect> {
        self.layers
            .iter()
            .filter_map(Layer::opaque_bounds)
            .reduce(|a, b| a.union(&b))
            .and_then(|bounds| bounds.intersect(&self.canvas()))
    }

    pub fn crop_to(&mut self, rect: Rect) {
        for layer in &mut self.layers {
            layer.crop_to(&rect);
        }
        self.width = rect.width;
        self.height = rect.height;
        self.selection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_rect_intersect_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(a.intersect(&Rect::new(10, 0, 5, 5)), None);
    }

    #[test]
    fn test_opaque_bounds_ignores_transparent_border() {
        let mut image = RgbaImage::new(10, 10);
        image.put_pixel(3, 4, Rgba([255, 0, 0, 255]));
        image.put_pixel(6, 7, Rgba([255, 0, 0, 1]));
        let layer = Layer::pixels("dot", 100, 200, image);
        assert_eq!(layer.opaque_bounds(), Some(Rect::new(103, 204, 4, 4)));
    }

    #[test]
    fn test_flatten_removes_nesting() {
        let layers = vec![Layer::group(
            "outer",
            vec![
                Layer::fill("a", Rect::new(0, 0, 1, 1), [0, 0, 0, 255]),
                Layer::group("inner", vec![Layer::fill("b", Rect::new(0, 0, 1, 1), [0, 0, 0, 255])]),
            ],
        )];
        let flat = flatten(layers);
        let names: Vec<_> = flat.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(flat.iter().all(|l| !l.is_group()));
    }

    #[test]
    fn test_crop_deletes_outside_pixels() {
        let mut doc = MemoryDocument::new("d", 20, 20)
            .with_layer(Layer::fill("a", Rect::new(5, 5, 10, 10), [1, 2, 3, 255]));
        let bounds = doc.content_bounds().unwrap();
        doc.crop_to(bounds);
        assert_eq!((doc.width, doc.height), (10, 10));
        match &doc.layers[0].content {
            LayerContent::Pixels { x, y, image } => {
                assert_eq!((*x, *y), (0, 0));
                assert_eq!(image.dimensions(), (10, 10));
            }
            _ => panic!("expected pixel layer"),
        }
    }

    #[test]
    fn test_composite_top_layer_wins() {
        let doc = MemoryDocument::new("d", 2, 1)
            .with_layer(Layer::fill("top", Rect::new(0, 0, 1, 1), [0, 255, 0, 255]))
            .with_layer(Layer::fill("bottom", Rect::new(0, 0, 2, 1), [255, 0, 0, 255]));
        let image = doc.composite();
        assert_eq!(image.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0, 255]);
    }
}
