use image::{
    imageops::{self, FilterType},
    GrayImage,
};
use tracing::{debug, warn};

use crate::{
    algorithms::extraction::{paper, ModeExtractor},
    config::ScoringConfig,
    error::Result,
    traits::StrokeExtractor,
    types::RasterImage,
};

/// Crops a drawing to its strokes and re-centers it on a square paper canvas
#[derive(Debug, Clone)]
pub struct CanvasNormalizer {
    pub strokes: ModeExtractor,
    pub side: u32,
    pub ref_long: u32,
    pub margin: u32,
}

impl Default for CanvasNormalizer {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl CanvasNormalizer {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            strokes: ModeExtractor::from_config(config),
            side: config.side,
            ref_long: config.ref_long,
            margin: config.margin,
        }
    }

    pub fn normalize(&self, raster: &RasterImage) -> Result<GrayImage> {
        let source = raster.intensity();
        let strokes = self.strokes.extract(source)?;
        let mut canvas = paper(self.side, self.side);

        let Some(bbox) = strokes.bounding_box() else {
            warn!(width = source.width(), height = source.height(), "no strokes found, canvas left blank");
            return Ok(canvas);
        };
        let crop_box = bbox.expand(self.margin, source.width(), source.height());
        let crop = imageops::crop_imm(source, crop_box.x, crop_box.y, crop_box.width, crop_box.height).to_image();

        let long = crop_box.width.max(crop_box.height).max(1) as f64;
        let ratio = (self.ref_long as f64 / long).min(self.side as f64 / long);
        let new_width = ((crop_box.width as f64 * ratio).round() as u32).clamp(1, self.side);
        let new_height = ((crop_box.height as f64 * ratio).round() as u32).clamp(1, self.side);
        let small = imageops::resize(&crop, new_width, new_height, FilterType::Triangle);

        let x0 = (self.side - new_width) / 2;
        let y0 = (self.side - new_height) / 2;
        imageops::replace(&mut canvas, &small, x0 as i64, y0 as i64);
        debug!(?crop_box, ratio, new_width, new_height, "normalized canvas");
        Ok(canvas)
    }
}

/// Resize a square canvas by `scale` and center it on a fresh paper canvas of `side`.
///
/// Content pushed past the border is clipped symmetrically.
pub fn place_at_scale(canvas: &GrayImage, side: u32, scale: f64) -> GrayImage {
    let new_width = ((canvas.width() as f64 * scale).round() as u32).max(1);
    let new_height = ((canvas.height() as f64 * scale).round() as u32).max(1);
    let resized = if new_width == canvas.width() && new_height == canvas.height() {
        canvas.clone()
    } else {
        imageops::resize(canvas, new_width, new_height, FilterType::Triangle)
    };
    let mut placed = paper(side, side);
    let x0 = (side as i64 - new_width as i64).div_euclid(2);
    let y0 = (side as i64 - new_height as i64).div_euclid(2);
    imageops::replace(&mut placed, &resized, x0, y0);
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractMode;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn off_center_drawing() -> RasterImage {
        let mut image = paper(300, 200);
        draw_filled_rect_mut(&mut image, Rect::at(200, 20).of_size(60, 30), Luma([0]));
        RasterImage::from_gray(image).expect("Should wrap")
    }

    #[test]
    fn content_is_centered_and_scaled_to_side() {
        let normalizer = CanvasNormalizer::default();
        let canvas = normalizer.normalize(&off_center_drawing()).expect("Should normalize");
        assert_eq!(canvas.dimensions(), (128, 128));

        let strokes = ExtractMode::Binary.extract(&canvas).expect("Should extract");
        let bbox = strokes.bounding_box().expect("Should keep strokes");
        // long side of the margin-expanded crop fills the canvas
        assert!(bbox.width > 100, "width {}", bbox.width);
        let center_x = bbox.x as f64 + bbox.width as f64 / 2.0;
        let center_y = bbox.y as f64 + bbox.height as f64 / 2.0;
        assert!((center_x - 64.0).abs() <= 2.0);
        assert!((center_y - 64.0).abs() <= 2.0);
    }

    #[test]
    fn normalization_is_deterministic() {
        let normalizer = CanvasNormalizer::default();
        let a = normalizer.normalize(&off_center_drawing()).expect("Should normalize");
        let b = normalizer.normalize(&off_center_drawing()).expect("Should normalize");
        assert_eq!(a, b);
    }

    #[test]
    fn blank_drawing_gives_blank_canvas() {
        let blank = RasterImage::from_gray(paper(50, 40)).expect("Should wrap");
        let canvas = CanvasNormalizer::default().normalize(&blank).expect("Should normalize");
        assert!(canvas.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn place_at_scale_keeps_center() {
        let mut canvas = paper(128, 128);
        draw_filled_rect_mut(&mut canvas, Rect::at(54, 54).of_size(20, 20), Luma([0]));
        for scale in [0.85, 1.0, 1.25] {
            let placed = place_at_scale(&canvas, 128, scale);
            assert_eq!(placed.dimensions(), (128, 128));
            let bbox = ExtractMode::Binary
                .extract(&placed)
                .expect("Should extract")
                .bounding_box()
                .expect("Should keep strokes");
            let center = bbox.x as f64 + bbox.width as f64 / 2.0;
            assert!((center - 64.0).abs() <= 1.5, "scale {scale}: center {center}");
        }
        assert_eq!(place_at_scale(&canvas, 128, 1.0), canvas);
    }
}
