use image::{GrayImage, Luma};
use imageproc::{
    contours::{find_contours, BorderType},
    contrast::otsu_level,
    edges::canny,
    filter::gaussian_blur_f32,
    point::Point,
    region_labelling::{connected_components, Connectivity},
};
use tracing::trace;

use crate::{
    algorithms::{faces::FaceSplitter, morphology::close_disc},
    config::{ContourRetrieval, ExtractMode, ScoringConfig, ShapeConfig},
    error::Result,
    traits::{ContourExtractor, StrokeExtractor},
    types::{BinaryMap, FOREGROUND, BACKGROUND},
};

/// Gradient edges with hysteresis thresholds tied to the median intensity
#[derive(Debug, Clone)]
pub struct EdgeExtractor {
    pub low_ratio: f32,
    pub high_ratio: f32,
}

impl Default for EdgeExtractor {
    fn default() -> Self {
        Self {
            low_ratio: 0.66,
            high_ratio: 1.33,
        }
    }
}

impl StrokeExtractor for EdgeExtractor {
    fn extract(&self, image: &GrayImage) -> Result<BinaryMap> {
        let median = median_intensity(image) as f32;
        // hysteresis follows neighbours at or above `low`, so it must stay above zero
        let low = (self.low_ratio * median).clamp(0.0, 255.0).floor().max(1.0);
        let high = (self.high_ratio * median).clamp(0.0, 255.0).floor().max(low);
        trace!(median, low, high, "edge thresholds");
        Ok(BinaryMap::from_mask(canny(image, low, high)))
    }
}

/// Otsu binarization of inverted intensity followed by a small closing
#[derive(Debug, Clone)]
pub struct BinaryExtractor {
    pub blur_sigma: f32,
    pub close: u32,
}

impl Default for BinaryExtractor {
    fn default() -> Self {
        Self {
            blur_sigma: 0.6,
            close: 3,
        }
    }
}

impl StrokeExtractor for BinaryExtractor {
    fn extract(&self, image: &GrayImage) -> Result<BinaryMap> {
        let ink = ink_mask(image, self.blur_sigma);
        Ok(BinaryMap::from_mask(close_disc(&ink, self.close)))
    }
}

/// The extractor selected by [`ExtractMode`], carrying its configured parameters
#[derive(Debug, Clone, Default)]
pub struct ModeExtractor {
    pub mode: ExtractMode,
    pub edge: EdgeExtractor,
    pub binary: BinaryExtractor,
}

impl ModeExtractor {
    pub fn new(mode: ExtractMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            mode: config.mode,
            edge: EdgeExtractor::default(),
            binary: BinaryExtractor {
                close: config.shapes.close,
                ..BinaryExtractor::default()
            },
        }
    }
}

impl StrokeExtractor for ModeExtractor {
    fn extract(&self, image: &GrayImage) -> Result<BinaryMap> {
        match self.mode {
            ExtractMode::Edge => self.edge.extract(image),
            ExtractMode::Binary => self.binary.extract(image),
        }
    }
}

impl StrokeExtractor for ExtractMode {
    fn extract(&self, image: &GrayImage) -> Result<BinaryMap> {
        ModeExtractor::new(*self).extract(image)
    }
}

/// Median of the intensity histogram (lower median for even counts).
pub fn median_intensity(image: &GrayImage) -> u8 {
    let mut histogram = [0usize; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total = image.width() as usize * image.height() as usize;
    let half = total.saturating_sub(1) / 2;
    let mut seen = 0usize;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > half {
            return value as u8;
        }
    }
    u8::MAX
}

/// Dark strokes as foreground: optional blur, then Otsu on the inverted intensity.
///
/// Paper-only images have a zero Otsu level and stay blank.
pub fn ink_mask(image: &GrayImage, blur_sigma: f32) -> GrayImage {
    let blurred;
    let source = if blur_sigma > 0.0 {
        blurred = gaussian_blur_f32(image, blur_sigma);
        &blurred
    } else {
        image
    };
    let mut inverted = source.clone();
    for pixel in inverted.pixels_mut() {
        pixel.0[0] = u8::MAX - pixel.0[0];
    }
    let level = otsu_level(&inverted);
    for pixel in inverted.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > level { FOREGROUND } else { BACKGROUND };
    }
    inverted
}

/// Border tracing through imageproc's Suzuki-Abe implementation.
///
/// A component enclosing several faces, such as two outlines drawn across
/// each other, is handed to the [`FaceSplitter`] and may come back as more
/// than one ring.
#[derive(Debug, Clone, Default)]
pub struct ImageprocContourExtractor {
    pub retrieval: ContourRetrieval,
    pub faces: FaceSplitter,
}

impl ImageprocContourExtractor {
    pub fn new(retrieval: ContourRetrieval) -> Self {
        Self {
            retrieval,
            faces: FaceSplitter::default(),
        }
    }

    pub fn from_config(config: &ShapeConfig) -> Self {
        Self {
            retrieval: config.retrieval,
            faces: FaceSplitter::from_config(config),
        }
    }
}

impl ContourExtractor for ImageprocContourExtractor {
    fn extract_contours(&self, binary_image: &GrayImage) -> Result<Vec<Vec<[f64; 2]>>> {
        let contours = find_contours::<i32>(binary_image);
        let mut labels = None;
        let mut result = Vec::new();

        for (index, contour) in contours.iter().enumerate() {
            let keep = contour.border_type == BorderType::Outer
                && match self.retrieval {
                    ContourRetrieval::External => contour.parent.is_none(),
                    ContourRetrieval::AllOuter => true,
                };
            if !keep {
                continue;
            }

            let holes: Vec<&[Point<i32>]> = contours
                .iter()
                .filter(|c| c.border_type == BorderType::Hole && c.parent == Some(index))
                .map(|c| c.points.as_slice())
                .collect();
            if holes.len() >= 2 {
                let labels = labels
                    .get_or_insert_with(|| connected_components(binary_image, Connectivity::Eight, Luma([0u8])));
                if let Some(figures) = self.faces.split(binary_image, labels, &contour.points, &holes) {
                    trace!(faces = holes.len(), figures = figures.len(), "split interlocking outlines");
                    result.extend(figures);
                    continue;
                }
            }
            result.push(contour.points.iter().map(|p| [p.x as f64, p.y as f64]).collect());
        }

        Ok(result)
    }
}

/// Extracts the inner borders (holes) of a binary image
#[derive(Debug, Clone, Default)]
pub struct HoleContourExtractor;

impl ContourExtractor for HoleContourExtractor {
    fn extract_contours(&self, binary_image: &GrayImage) -> Result<Vec<Vec<[f64; 2]>>> {
        Ok(find_contours::<i32>(binary_image)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Hole)
            .map(|contour| contour.points.iter().map(|p| [p.x as f64, p.y as f64]).collect())
            .collect())
    }
}

/// Paper-white canvas of the given size.
pub fn paper(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([crate::types::PAPER]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    fn create_test_image() -> GrayImage {
        let mut image = paper(64, 64);
        draw_filled_rect_mut(&mut image, Rect::at(16, 16).of_size(32, 24), Luma([0]));
        image
    }

    #[test]
    fn binary_mode_marks_dark_ink() {
        let map = ExtractMode::Binary.extract(&create_test_image()).expect("Should extract");
        assert!(map.is_foreground(30, 30));
        assert!(!map.is_foreground(2, 2));
        let bbox = map.bounding_box().expect("Should find ink");
        assert!(bbox.x.abs_diff(16) <= 1 && bbox.width.abs_diff(32) <= 2);
    }

    #[test]
    fn edge_mode_traces_the_outline() {
        let map = ExtractMode::Edge.extract(&create_test_image()).expect("Should extract");
        assert!(!map.is_blank());
        // interior of the filled block has no gradient
        assert!(!map.is_foreground(32, 28));
    }

    #[test]
    fn edge_mode_handles_dark_backgrounds() {
        let mut image = GrayImage::new(128, 128);
        draw_filled_rect_mut(&mut image, Rect::at(49, 49).of_size(30, 30), Luma([255]));
        assert_eq!(median_intensity(&image), 0);

        let map = ExtractMode::Edge.extract(&image).expect("Should extract");
        assert!(!map.is_blank());
        let bbox = map.bounding_box().expect("Should find the outline");
        assert!(bbox.x.abs_diff(49) <= 2 && bbox.width.abs_diff(30) <= 4, "{bbox:?}");

        let mut nearly_black = GrayImage::from_pixel(64, 64, Luma([1]));
        draw_filled_rect_mut(&mut nearly_black, Rect::at(20, 20).of_size(20, 20), Luma([200]));
        assert!(!ExtractMode::Edge.extract(&nearly_black).expect("Should extract").is_blank());
    }

    #[test]
    fn configured_close_kernel_reaches_binary_mode() {
        let mut image = paper(64, 64);
        draw_filled_rect_mut(&mut image, Rect::at(10, 30).of_size(20, 3), Luma([0]));
        draw_filled_rect_mut(&mut image, Rect::at(34, 30).of_size(20, 3), Luma([0]));

        let default = ModeExtractor::new(ExtractMode::Binary).extract(&image).expect("Should extract");
        assert!(!default.is_foreground(32, 31));

        let mut config = ScoringConfig::default();
        config.shapes.close = 9;
        let wide = ModeExtractor::from_config(&config).extract(&image).expect("Should extract");
        assert!(wide.is_foreground(32, 31));
    }

    #[test]
    fn blank_paper_extracts_nothing() {
        let blank = paper(32, 32);
        assert!(ExtractMode::Binary.extract(&blank).expect("Should extract").is_blank());
        assert!(ExtractMode::Edge.extract(&blank).expect("Should extract").is_blank());
    }

    #[test]
    fn median_of_mostly_white_image() {
        assert_eq!(median_intensity(&create_test_image()), 255);
        let mut dark = paper(2, 2);
        dark.put_pixel(0, 0, Luma([0]));
        dark.put_pixel(1, 0, Luma([0]));
        assert_eq!(median_intensity(&dark), 0);
    }

    #[test]
    fn retrieval_modes_differ_on_nested_outlines() {
        let mut image = paper(80, 80);
        draw_hollow_rect_mut(&mut image, Rect::at(5, 5).of_size(70, 70), Luma([0]));
        draw_filled_rect_mut(&mut image, Rect::at(30, 30).of_size(20, 20), Luma([0]));
        let ink = ink_mask(&image, 0.0);

        let external = ImageprocContourExtractor::new(ContourRetrieval::External)
            .extract_contours(&ink)
            .expect("Should trace");
        let all = ImageprocContourExtractor::new(ContourRetrieval::AllOuter)
            .extract_contours(&ink)
            .expect("Should trace");
        assert_eq!(external.len(), 1);
        assert_eq!(all.len(), 2);

        let holes = HoleContourExtractor.extract_contours(&ink).expect("Should trace");
        assert_eq!(holes.len(), 1);
    }
}
