//! Intersection-existence check.
//!
//! Decides whether the user's drawing contains a closed loop near the waist
//! of the target figure, the way two overlapping outlines enclose a small
//! quadrilateral where they cross. Every criterion is a soft weight so a
//! roughly right loop still earns partial credit.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use crate::{
    algorithms::{
        extraction::{ink_mask, HoleContourExtractor, ModeExtractor},
        morphology::{close_disc, dilate_disc},
        simplification::{ring_area, ring_perimeter, ring_polygon, DouglasPeuckerApproximator},
    },
    config::{FeatureConfig, FeatureKind},
    error::Result,
    report::{clamp_score, FeatureReport},
    traits::{ContourExtractor, PolygonApproximator, StrokeExtractor},
    types::PixelBox,
};

const PROFILE_TAPS: usize = 9;
/// Sigma of the standard 9-tap Gaussian kernel
const PROFILE_SIGMA: f64 = 1.7;

/// Horizontal band around the narrowest row of the target figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaistBand {
    pub row: u32,
    pub y0: u32,
    pub y1: u32,
}

#[derive(Debug, Clone, Default)]
pub struct IntersectionScorer {
    pub strokes: ModeExtractor,
    pub config: FeatureConfig,
}

impl IntersectionScorer {
    pub fn new(strokes: ModeExtractor, config: FeatureConfig) -> Self {
        Self { strokes, config }
    }

    /// Thick filled strokes of a drawing, largest 8-connected component only.
    pub fn filled_strokes(&self, canvas: &GrayImage) -> GrayImage {
        filled_strokes(canvas, &self.config)
    }

    pub fn waist_band(&self, target: &GrayImage) -> WaistBand {
        let filled = self.filled_strokes(target);
        let height = filled.height();
        let row = narrowest_row(&filled).unwrap_or(height / 2);

        let band_h = ((self.config.waist_band_frac * height as f64).round() as u32).max(8);
        WaistBand {
            row,
            y0: row.saturating_sub(band_h / 2),
            y1: (row + (band_h - band_h / 2)).min(height),
        }
    }

    /// Score the best closed loop of the user drawing against the target's waist.
    pub fn score(&self, user: &GrayImage, target: &GrayImage) -> Result<FeatureReport> {
        let band = self.waist_band(target);
        let strokes = self.strokes.extract(user)?;
        let thick = dilate_disc(strokes.as_image(), self.config.hole_dilate);
        let line_band = close_disc(&thick, self.config.hole_close);
        let holes = HoleContourExtractor.extract_contours(&line_band)?;

        let mut best = FeatureReport::missing(FeatureKind::Loop, band.row, [band.y0, band.y1]);
        let (width, height) = user.dimensions();
        for hole in &holes {
            let candidate = self.score_hole(hole, band, width, height);
            if candidate.score > best.score {
                best = candidate;
            }
        }
        debug!(holes = holes.len(), score = best.score, found = best.found, "intersection check");
        Ok(best)
    }

    fn score_hole(&self, hole: &[[f64; 2]], band: WaistBand, width: u32, height: u32) -> FeatureReport {
        let c = &self.config;
        let area_frac = ring_area(hole) / (width as f64 * height as f64);
        let area_w = if area_frac <= 0.0 {
            0.0
        } else if area_frac < c.hole_area_min_frac {
            (area_frac / c.hole_area_min_frac).max(0.3)
        } else if area_frac > c.hole_area_max_frac {
            (c.hole_area_max_frac / area_frac).max(0.3)
        } else {
            1.0
        };

        let bbox = ring_box(hole);
        let overlap = ((bbox.y + bbox.height).min(band.y1) as i64 - bbox.y.max(band.y0) as i64).max(0);
        let band_overlap = overlap as f64 / (band.y1.saturating_sub(band.y0)).max(1) as f64;
        let band_w = 0.2 + 0.8 * (band_overlap * 1.2).clamp(0.0, 1.0);

        let perimeter = ring_perimeter(hole);
        let approx = DouglasPeuckerApproximator.approximate(hole, 0.03 * perimeter);
        let vertices = approx.len();
        let quad = (4..=6).contains(&vertices);
        let verts_w = if quad {
            1.0
        } else if (3..=8).contains(&vertices) {
            0.7
        } else {
            0.4
        };
        let convex_w = if is_convex(&approx) { 1.0 } else { 0.85 };

        let angle_score = if vertices >= 4 {
            let angles = interior_angles(&approx);
            let tol = 2.0 * c.angle_tol;
            let e0 = (angles[0] + angles[2] - 180.0).abs();
            let e1 = (angles[1] + angles[3] - 180.0).abs();
            0.5 * ((1.0 - e0 / tol).max(0.0) + (1.0 - e1 / tol).max(0.0))
        } else {
            0.5
        };
        let flat = min_rect_flatness(hole);
        let flat_score = ((flat - c.flat_min) / (1.0 - c.flat_min).max(1e-6)).clamp(0.0, 1.0);

        let center = hole_center(hole, &bbox);
        let dist_x = (center[0] - (width / 2) as f64).abs();
        let dist_y = (center[1] - band.row as f64).abs();
        let y_span = ((band.y1 - band.y0) / 2).max(1) as f64;
        let y_score = (1.0 - dist_y / (y_span * 1.5)).max(0.0);
        let x_score = (1.0 - dist_x / (width as f64 * 0.25)).max(0.0);
        let center_score = 0.5 * (y_score + x_score);

        let mut geom = 0.5 * angle_score + 0.5 * flat_score;
        if quad {
            geom *= 1.0 + c.quad_bonus;
        }
        let score = clamp_score(
            100.0 * band_w * area_w * convex_w * verts_w * (c.center_weight * center_score + c.shape_weight * geom),
        );

        FeatureReport {
            score,
            found: true,
            hole_bbox: Some(bbox),
            hole_area_frac: area_frac,
            flatness: flat,
            quad,
            center_distance: dist_x.hypot(dist_y),
            ..FeatureReport::missing(FeatureKind::Loop, band.row, [band.y0, band.y1])
        }
    }
}

/// Ink of a drawing closed and thickened with the fill kernels, largest component only.
pub(crate) fn filled_strokes(canvas: &GrayImage, config: &FeatureConfig) -> GrayImage {
    let ink = ink_mask(canvas, 0.0);
    let closed = close_disc(&ink, config.fill_close);
    let thick = dilate_disc(&closed, config.fill_dilate);
    largest_component(&thick)
}

/// Row with the fewest foreground pixels, after smoothing, between 30% and 70%
/// of the height. `None` when that range is empty or holds no foreground.
pub(crate) fn narrowest_row(mask: &GrayImage) -> Option<u32> {
    let height = mask.height();
    let rows: Vec<f64> = (0..height)
        .map(|y| (0..mask.width()).filter(|&x| mask.get_pixel(x, y).0[0] != 0).count() as f64)
        .collect();
    let rows = smooth_profile(&rows);

    let lo = (0.30 * height as f64) as usize;
    let hi = (0.70 * height as f64) as usize;
    if hi <= lo || rows[lo..hi].iter().all(|&v| v == 0.0) {
        return None;
    }
    let mut best = lo;
    for y in lo..hi {
        if rows[y] < rows[best] {
            best = y;
        }
    }
    Some(best as u32)
}

fn largest_component(mask: &GrayImage) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut sizes: Vec<usize> = Vec::new();
    for label in labels.pixels() {
        let id = label.0[0] as usize;
        if id == 0 {
            continue;
        }
        if sizes.len() <= id {
            sizes.resize(id + 1, 0);
        }
        sizes[id] += 1;
    }
    let mut keep = 0usize;
    for (id, &size) in sizes.iter().enumerate().skip(1) {
        if keep == 0 || size > sizes[keep] {
            keep = id;
        }
    }
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let id = labels.get_pixel(x, y).0[0] as usize;
        Luma([if keep != 0 && id == keep { 255 } else { 0 }])
    })
}

/// 9-tap Gaussian smoothing with mirrored borders.
fn smooth_profile(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }
    let half = (PROFILE_TAPS / 2) as i64;
    let weights: Vec<f64> = (-half..=half)
        .map(|i| (-(i * i) as f64 / (2.0 * PROFILE_SIGMA * PROFILE_SIGMA)).exp())
        .collect();
    let norm: f64 = weights.iter().sum();
    let last = n as i64 - 1;
    let reflect = |i: i64| -> usize {
        let mut i = i;
        while i < 0 || i > last {
            i = if i < 0 { -i } else { 2 * last - i };
        }
        i as usize
    };
    (0..n as i64)
        .map(|center| {
            weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect(center + k as i64 - half)])
                .sum::<f64>()
                / norm
        })
        .collect()
}

pub(crate) fn ring_box(ring: &[[f64; 2]]) -> PixelBox {
    let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
    let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &[x, y] in ring {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    PixelBox {
        x: x0.max(0.0) as u32,
        y: y0.max(0.0) as u32,
        width: (x1 - x0) as u32 + 1,
        height: (y1 - y0) as u32 + 1,
    }
}

fn hole_center(ring: &[[f64; 2]], bbox: &PixelBox) -> [f64; 2] {
    use geo::Centroid;
    match ring_polygon(ring).centroid() {
        Some(point) if point.x().is_finite() && point.y().is_finite() => [point.x(), point.y()],
        _ => [
            (bbox.x + bbox.width / 2) as f64,
            (bbox.y + bbox.height / 2) as f64,
        ],
    }
}

/// Short over long side of the minimum-area rectangle, 1 for degenerate rings.
fn min_rect_flatness(ring: &[[f64; 2]]) -> f64 {
    use geo::MinimumRotatedRect;

    let Some(rect) = ring_polygon(ring).minimum_rotated_rect() else {
        return 1.0;
    };
    let corners: Vec<(f64, f64)> = rect.exterior().coords().map(|c| (c.x, c.y)).collect();
    if corners.len() < 3 {
        return 1.0;
    }
    let a = (corners[1].0 - corners[0].0).hypot(corners[1].1 - corners[0].1);
    let b = (corners[2].0 - corners[1].0).hypot(corners[2].1 - corners[1].1);
    if a <= 0.0 || b <= 0.0 {
        return 1.0;
    }
    a.min(b) / a.max(b)
}

fn interior_angles(points: &[[f64; 2]]) -> Vec<f64> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b, c) = (points[(i + n - 1) % n], points[i], points[(i + 1) % n]);
            let (bax, bay) = (a[0] - b[0], a[1] - b[1]);
            let (bcx, bcy) = (c[0] - b[0], c[1] - b[1]);
            let cos = (bax * bcx + bay * bcy) / (bax.hypot(bay) * bcx.hypot(bcy) + 1e-6);
            cos.clamp(-1.0, 1.0).acos().to_degrees()
        })
        .collect()
}

/// Every turn has the same sign.
pub(crate) fn is_convex(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let (a, b, c) = (points[i], points[(i + 1) % n], points[(i + 2) % n]);
        let cross = (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0]);
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}
