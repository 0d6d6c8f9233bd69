use std::f64::consts::PI;

use image::{GrayImage, Luma};
use imageproc::{drawing::draw_polygon_mut, point::Point};
use tracing::debug;

use crate::{
    algorithms::{
        extraction::{ink_mask, ImageprocContourExtractor},
        morphology::{close_disc, dilate_disc, open_disc},
        simplification::{distance, open_ring, ring_area, ring_perimeter, ring_polygon, DouglasPeuckerApproximator},
    },
    config::ShapeConfig,
    error::Result,
    traits::{ContourExtractor, PolygonApproximator},
    types::{Orientation, OverlapMatrix, PixelBox, ShapeDescriptor, ShapeKind, ShapeSet},
};

/// Splits a normalized canvas into classified primitive shapes
#[derive(Debug, Clone)]
pub struct ShapeDecomposer<C = ImageprocContourExtractor, A = DouglasPeuckerApproximator>
where
    C: ContourExtractor,
    A: PolygonApproximator,
{
    pub config: ShapeConfig,
    pub contour_extractor: C,
    pub approximator: A,
}

impl ShapeDecomposer {
    pub fn new(config: ShapeConfig) -> Self {
        Self {
            contour_extractor: ImageprocContourExtractor::from_config(&config),
            approximator: DouglasPeuckerApproximator,
            config,
        }
    }
}

impl Default for ShapeDecomposer {
    fn default() -> Self {
        Self::new(ShapeConfig::default())
    }
}

impl<C, A> ShapeDecomposer<C, A>
where
    C: ContourExtractor,
    A: PolygonApproximator,
{
    /// Blur, threshold and clean the canvas into filled stroke regions.
    pub fn binarize(&self, canvas: &GrayImage) -> GrayImage {
        let ink = ink_mask(canvas, self.config.blur_sigma);
        let closed = close_disc(&ink, self.config.close);
        let thick = dilate_disc(&closed, self.config.dilate);
        open_disc(&thick, self.config.open)
    }

    pub fn decompose(&self, canvas: &GrayImage) -> Result<ShapeSet> {
        let (width, height) = canvas.dimensions();
        let binary = self.binarize(canvas);
        let contours = self.contour_extractor.extract_contours(&binary)?;

        let canvas_area = width as f64 * height as f64;
        let min_area = self.config.area_min_ratio * canvas_area;
        let total = contours.len();
        let shapes: Vec<ShapeDescriptor> = contours
            .into_iter()
            .filter_map(|contour| self.describe(contour, width, height, min_area))
            .collect();
        let overlap = overlap_matrix(&shapes, width, height);

        debug!(
            shapes = shapes.len(),
            discarded = total - shapes.len(),
            max_overlap = overlap.max_overlap(),
            "decomposed canvas"
        );
        Ok(ShapeSet {
            shapes,
            overlap,
            canvas_width: width,
            canvas_height: height,
        })
    }

    fn describe(&self, contour: Vec<[f64; 2]>, width: u32, height: u32, min_area: f64) -> Option<ShapeDescriptor> {
        if open_ring(&contour).len() < 3 {
            return None;
        }
        let area = ring_area(&contour);
        if area <= min_area {
            return None;
        }
        let perimeter = ring_perimeter(&contour);
        let approx = self
            .approximator
            .approximate(&contour, self.config.approx_epsilon * perimeter);
        let vertex_count = approx.len();
        let bounding_box = contour_box(&contour);
        let aspect_ratio = bounding_box.width as f64 / bounding_box.height.max(1) as f64;
        let center = polygon_centroid(&contour, &bounding_box);
        let circularity = if perimeter > 0.0 {
            4.0 * PI * area / (perimeter * perimeter)
        } else {
            0.0
        };
        let (kind, orientation) = self.classify(&approx, center, circularity);

        Some(ShapeDescriptor {
            centroid: [center[0] / width as f64, center[1] / height as f64],
            contour,
            approx,
            area,
            perimeter,
            bounding_box,
            aspect_ratio,
            vertex_count,
            circularity,
            kind,
            orientation,
        })
    }

    fn classify(&self, approx: &[[f64; 2]], center: [f64; 2], circularity: f64) -> (ShapeKind, Option<Orientation>) {
        let vertices = approx.len();
        if circularity > self.config.circularity_min && vertices >= self.config.circle_min_vertices {
            return (ShapeKind::Circle, None);
        }
        match vertices {
            3 => (ShapeKind::Triangle, Some(triangle_orientation(approx, center))),
            4 => {
                if side_ratio(approx) >= 1.0 - self.config.square_tolerance {
                    (ShapeKind::Square, None)
                } else {
                    (ShapeKind::Rectangle, None)
                }
            }
            _ => (ShapeKind::Polygon, None),
        }
    }
}

/// Direction of the vector from the centroid to the farthest vertex.
pub fn triangle_orientation(vertices: &[[f64; 2]], center: [f64; 2]) -> Orientation {
    let apex = vertices
        .iter()
        .copied()
        .max_by(|a, b| distance(center, *a).total_cmp(&distance(center, *b)))
        .unwrap_or(center);
    let (dx, dy) = (apex[0] - center[0], apex[1] - center[1]);
    if dx.abs() >= dy.abs() {
        if dx >= 0.0 { Orientation::Right } else { Orientation::Left }
    } else if dy < 0.0 {
        Orientation::Up
    } else {
        Orientation::Down
    }
}

/// Short over long side of the minimum-area rectangle around the vertices.
fn side_ratio(vertices: &[[f64; 2]]) -> f64 {
    use geo::MinimumRotatedRect;

    let Some(rect) = ring_polygon(vertices).minimum_rotated_rect() else {
        return 0.0;
    };
    let corners: Vec<[f64; 2]> = rect.exterior().coords().map(|c| [c.x, c.y]).collect();
    if corners.len() < 3 {
        return 0.0;
    }
    let a = distance(corners[0], corners[1]);
    let b = distance(corners[1], corners[2]);
    let long = a.max(b);
    if long <= 0.0 { 0.0 } else { a.min(b) / long }
}

fn contour_box(contour: &[[f64; 2]]) -> PixelBox {
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    for &[x, y] in contour {
        min = [min[0].min(x), min[1].min(y)];
        max = [max[0].max(x), max[1].max(y)];
    }
    PixelBox {
        x: min[0].max(0.0) as u32,
        y: min[1].max(0.0) as u32,
        width: (max[0] - min[0]) as u32 + 1,
        height: (max[1] - min[1]) as u32 + 1,
    }
}

fn polygon_centroid(contour: &[[f64; 2]], bbox: &PixelBox) -> [f64; 2] {
    use geo::Centroid;
    match ring_polygon(contour).centroid() {
        Some(point) if point.x().is_finite() && point.y().is_finite() => [point.x(), point.y()],
        // Fallback to bounding box center
        _ => [
            bbox.x as f64 + (bbox.width as f64 - 1.0) / 2.0,
            bbox.y as f64 + (bbox.height as f64 - 1.0) / 2.0,
        ],
    }
}

/// Filled pixel mask of one shape.
pub fn rasterize_shape(shape: &ShapeDescriptor, width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let mut points: Vec<Point<i32>> = open_ring(&shape.contour)
        .iter()
        .map(|&[x, y]| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() >= 3 {
        draw_polygon_mut(&mut mask, &points, Luma([255]));
    }
    mask
}

/// Intersection over the smaller region for every pair of shapes.
pub fn overlap_matrix(shapes: &[ShapeDescriptor], width: u32, height: u32) -> OverlapMatrix {
    let masks: Vec<Vec<bool>> = shapes
        .iter()
        .map(|shape| {
            rasterize_shape(shape, width, height)
                .pixels()
                .map(|p| p.0[0] != 0)
                .collect()
        })
        .collect();
    let counts: Vec<usize> = masks.iter().map(|m| m.iter().filter(|&&v| v).count()).collect();

    let mut matrix = OverlapMatrix::new(shapes.len());
    for i in 0..masks.len() {
        for j in (i + 1)..masks.len() {
            let smaller = counts[i].min(counts[j]);
            if smaller == 0 {
                continue;
            }
            let shared = masks[i]
                .iter()
                .zip(&masks[j])
                .filter(|(a, b)| **a && **b)
                .count();
            matrix.set(i, j, shared as f64 / smaller as f64);
        }
    }
    matrix
}
