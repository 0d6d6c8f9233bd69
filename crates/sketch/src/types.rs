use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{Result, SketchError};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;
/// Paper colour of every normalized canvas
pub const PAPER: u8 = 255;

/// Decoded input drawing.
///
/// The original channel count is remembered for reporting; the pixels are
/// kept as 8-bit intensity with any alpha composited over white paper.
#[derive(Debug, Clone)]
pub struct RasterImage {
    intensity: GrayImage,
    channels: u8,
}

impl RasterImage {
    /// Build from an interleaved 8-bit buffer with 1, 3 or 4 channels.
    pub fn from_raw(width: u32, height: u32, channels: u8, bytes: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SketchError::decode(format!("zero extent {width}x{height}")));
        }
        let expected = width as usize * height as usize * channels as usize;
        if bytes.len() != expected {
            return Err(SketchError::decode(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                bytes.len()
            )));
        }
        let dynamic = match channels {
            1 => ImageBuffer::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
            3 => ImageBuffer::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
            other => {
                return Err(SketchError::decode(format!(
                    "unsupported channel count {other}, expected 1, 3 or 4"
                )));
            }
        };
        let dynamic = dynamic.ok_or_else(|| SketchError::decode("pixel buffer does not match its dimensions"))?;
        Self::from_dynamic(&dynamic)
    }

    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SketchError::decode("image has zero extent"));
        }
        let color = image.color();
        let intensity = if color.has_alpha() {
            DynamicImage::ImageRgb8(composite_over_white(image)).to_luma8()
        } else {
            image.to_luma8()
        };
        Ok(Self {
            intensity,
            channels: color.channel_count(),
        })
    }

    /// Decode an encoded buffer (PNG, JPEG).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Self::from_dynamic(&image)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let image = image::open(path)?;
        Self::from_dynamic(&image)
    }

    /// Wrap an intensity image directly. Zero-extent images are rejected.
    pub fn from_gray(intensity: GrayImage) -> Result<Self> {
        if intensity.width() == 0 || intensity.height() == 0 {
            return Err(SketchError::decode("image has zero extent"));
        }
        Ok(Self { intensity, channels: 1 })
    }

    pub fn width(&self) -> u32 {
        self.intensity.width()
    }

    pub fn height(&self) -> u32 {
        self.intensity.height()
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn intensity(&self) -> &GrayImage {
        &self.intensity
    }
}

fn composite_over_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    /// Grow by `margin` on every side, clipped to a `width`x`height` frame.
    pub fn expand(&self, margin: u32, width: u32, height: u32) -> PixelBox {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let x1 = self.x.saturating_add(self.width).saturating_add(margin).min(width);
        let y1 = self.y.saturating_add(self.height).saturating_add(margin).min(height);
        PixelBox {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Single-channel map where strokes are [`FOREGROUND`] and everything else is [`BACKGROUND`].
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMap {
    pixels: GrayImage,
}

impl BinaryMap {
    /// Any non-zero pixel becomes foreground.
    pub fn from_mask(mut pixels: GrayImage) -> Self {
        for pixel in pixels.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > 0 { FOREGROUND } else { BACKGROUND };
        }
        Self { pixels }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::from_pixel(width, height, Luma([BACKGROUND])),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn into_image(self) -> GrayImage {
        self.pixels
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y).0[0] != BACKGROUND
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.pixels().filter(|p| p.0[0] != BACKGROUND).count()
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[0] == BACKGROUND)
    }

    /// Tight box around the foreground, `None` for a blank map.
    pub fn bounding_box(&self) -> Option<PixelBox> {
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        let mut found = false;
        for (x, y, pixel) in self.pixels.enumerate_pixels() {
            if pixel.0[0] != BACKGROUND {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        found.then(|| PixelBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }

    /// Intersection over union of the two foregrounds. Two blank maps share nothing.
    pub fn iou(&self, other: &BinaryMap) -> f64 {
        let (mut inter, mut union) = (0usize, 0usize);
        for (a, b) in self.pixels.pixels().zip(other.pixels.pixels()) {
            let (fa, fb) = (a.0[0] != BACKGROUND, b.0[0] != BACKGROUND);
            inter += (fa && fb) as usize;
            union += (fa || fb) as usize;
        }
        if union == 0 { 0.0 } else { inter as f64 / union as f64 }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShapeKind {
    Triangle,
    Square,
    Rectangle,
    Circle,
    /// Any other closed outline; the vertex count lives on the descriptor
    Polygon,
}

/// Cardinal direction a triangle points to, in image coordinates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeDescriptor {
    /// Traced boundary points in canvas pixels
    pub contour: Vec<[f64; 2]>,
    /// Vertices of the simplified polygon
    pub approx: Vec<[f64; 2]>,
    pub area: f64,
    pub perimeter: f64,
    /// Centroid divided by the canvas size, in [0, 1]²
    pub centroid: [f64; 2],
    pub bounding_box: PixelBox,
    pub aspect_ratio: f64,
    pub vertex_count: usize,
    pub circularity: f64,
    pub kind: ShapeKind,
    pub orientation: Option<Orientation>,
}

impl ShapeDescriptor {
    /// Type label, `polygon-N` for generic polygons.
    pub fn label(&self) -> String {
        match self.kind {
            ShapeKind::Polygon => format!("polygon-{}", self.vertex_count),
            kind => kind.to_string(),
        }
    }
}

/// Symmetric matrix of pairwise overlap ratios. The diagonal is unused and reads as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlapMatrix {
    size: usize,
    values: Vec<f64>,
}

impl OverlapMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j || i >= self.size || j >= self.size {
            return 0.0;
        }
        self.values[i * self.size + j]
    }

    pub(crate) fn set(&mut self, i: usize, j: usize, value: f64) {
        if i == j {
            return;
        }
        self.values[i * self.size + j] = value;
        self.values[j * self.size + i] = value;
    }

    /// Largest off-diagonal entry, 0 when fewer than two shapes exist.
    pub fn max_overlap(&self) -> f64 {
        let mut max = 0.0f64;
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                max = max.max(self.get(i, j));
            }
        }
        max
    }
}

/// Flat arena of the shapes found on one canvas, indexed by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeSet {
    pub shapes: Vec<ShapeDescriptor>,
    pub overlap: OverlapMatrix,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl ShapeSet {
    pub fn empty(canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            shapes: Vec::new(),
            overlap: OverlapMatrix::new(0),
            canvas_width,
            canvas_height,
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn canvas_area(&self) -> f64 {
        (self.canvas_width as f64 * self.canvas_height as f64).max(1.0)
    }

    pub fn get(&self, index: usize) -> Option<&ShapeDescriptor> {
        self.shapes.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn raw_buffers_are_validated() {
        assert!(matches!(
            RasterImage::from_raw(0, 4, 1, Vec::new()),
            Err(SketchError::InputDecode(_))
        ));
        assert!(matches!(
            RasterImage::from_raw(2, 2, 2, vec![0; 8]),
            Err(SketchError::InputDecode(_))
        ));
        assert!(matches!(
            RasterImage::from_raw(2, 2, 3, vec![0; 11]),
            Err(SketchError::InputDecode(_))
        ));
        let raster = RasterImage::from_raw(2, 2, 3, vec![10; 12]).expect("Should decode");
        assert_eq!(raster.channels(), 3);
        assert_eq!(raster.width(), 2);
    }

    #[test]
    fn transparent_pixels_read_as_paper() {
        let mut rgba = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let raster = RasterImage::from_dynamic(&DynamicImage::ImageRgba8(rgba)).expect("Should decode");
        assert_eq!(raster.channels(), 4);
        assert_eq!(raster.intensity().get_pixel(0, 0).0[0], 255);
        assert_eq!(raster.intensity().get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn binary_map_box_and_iou() {
        let mut mask = GrayImage::new(10, 10);
        for y in 2..5 {
            for x in 3..7 {
                mask.put_pixel(x, y, Luma([1]));
            }
        }
        let map = BinaryMap::from_mask(mask);
        assert_eq!(map.foreground_count(), 12);
        assert_eq!(
            map.bounding_box(),
            Some(PixelBox { x: 3, y: 2, width: 4, height: 3 })
        );
        assert!((map.iou(&map) - 1.0).abs() < 1e-12);
        let blank = BinaryMap::blank(10, 10);
        assert!(blank.bounding_box().is_none());
        assert_eq!(blank.iou(&blank), 0.0);
        assert_eq!(map.iou(&blank), 0.0);
    }

    #[test]
    fn expand_clips_to_frame() {
        let bbox = PixelBox { x: 2, y: 8, width: 5, height: 2 };
        let grown = bbox.expand(6, 12, 12);
        assert_eq!(grown, PixelBox { x: 0, y: 2, width: 12, height: 10 });
    }

    #[test]
    fn huge_margin_covers_the_frame() {
        let bbox = PixelBox { x: 40, y: 10, width: 20, height: 30 };
        let grown = bbox.expand(u32::MAX, 100, 80);
        assert_eq!(grown, PixelBox { x: 0, y: 0, width: 100, height: 80 });
    }

    #[test]
    fn overlap_matrix_is_symmetric() {
        let mut matrix = OverlapMatrix::new(3);
        matrix.set(0, 2, 0.4);
        matrix.set(1, 1, 0.9);
        assert_eq!(matrix.get(2, 0), 0.4);
        assert_eq!(matrix.get(1, 1), 0.0);
        assert_eq!(matrix.max_overlap(), 0.4);
        assert_eq!(OverlapMatrix::new(1).max_overlap(), 0.0);
    }
}
