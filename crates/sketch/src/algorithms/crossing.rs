//! Crossing check.
//!
//! Two figures drawn across each other meet in a band around the waist of
//! the combined figure. The filled drawing is cut at its narrowest row into
//! an upper and a lower half that share a few rows; the shape of that shared
//! band is compared between user and target with Hu moment invariants.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use tracing::debug;

use crate::{
    algorithms::{
        intersection::{filled_strokes, is_convex, narrowest_row, ring_box},
        simplification::{open_ring, ring_area, ring_perimeter, DouglasPeuckerApproximator},
    },
    config::{FeatureConfig, FeatureKind},
    report::{clamp_score, FeatureReport},
    traits::PolygonApproximator,
};

/// Hu invariants at or below this magnitude are left out of the distance.
const HU_EPSILON: f64 = 1e-5;

/// A filled drawing cut at its waist.
#[derive(Debug, Clone)]
pub struct WaistSplit {
    pub row: u32,
    /// Rows `[y0, y1)` shared by the upper and lower halves
    pub band: [u32; 2],
    /// Foreground pixels inside the shared rows
    pub shared: GrayImage,
    pub shared_pixels: usize,
    /// Pixel count of the smaller half, at least 1
    pub base: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CrossingScorer {
    pub config: FeatureConfig,
}

impl CrossingScorer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Cut the filled strokes of a canvas at the narrowest row between 30% and
    /// 70% of its height. `None` when nothing is drawn in that range.
    pub fn split(&self, canvas: &GrayImage) -> Option<WaistSplit> {
        let filled = filled_strokes(canvas, &self.config);
        let row = narrowest_row(&filled)?;
        let margin = self.config.crossing.margin;
        let y0 = row.saturating_sub(margin);
        let y1 = row.saturating_add(margin).min(filled.height());

        let (mut upper, mut lower) = (0usize, 0usize);
        for (_, y, pixel) in filled.enumerate_pixels() {
            if pixel.0[0] == 0 {
                continue;
            }
            if y < y1 {
                upper += 1;
            }
            if y >= y0 {
                lower += 1;
            }
        }
        let shared = GrayImage::from_fn(filled.width(), filled.height(), |x, y| {
            let inside = (y0..y1).contains(&y) && filled.get_pixel(x, y).0[0] != 0;
            Luma([if inside { 255 } else { 0 }])
        });
        let shared_pixels = shared.pixels().filter(|p| p.0[0] != 0).count();

        Some(WaistSplit {
            row,
            band: [y0, y1],
            shared,
            shared_pixels,
            base: upper.min(lower).max(1),
        })
    }

    /// Compare the user's crossing band with the target's.
    pub fn score(&self, user: &GrayImage, target: &GrayImage) -> FeatureReport {
        let c = &self.config.crossing;
        let Some(user_split) = self.split(user) else {
            debug!("user drawing has nothing at the waist");
            return FeatureReport::missing(FeatureKind::Crossing, 0, [0, 0]);
        };
        let missing = FeatureReport {
            overlap_ratio: user_split.shared_pixels as f64 / user_split.base as f64,
            ..FeatureReport::missing(FeatureKind::Crossing, user_split.row, user_split.band)
        };
        if missing.overlap_ratio < c.area_min_ratio {
            debug!(ratio = missing.overlap_ratio, "halves barely meet");
            return missing;
        }
        let Some(target_split) = self.split(target) else {
            return missing;
        };
        let (Some(user_ring), Some(target_ring)) = (largest_ring(&user_split.shared), largest_ring(&target_split.shared))
        else {
            return missing;
        };
        let Some(hu) = hu_distance(&user_ring, &target_ring) else {
            return missing;
        };

        let approx = DouglasPeuckerApproximator.approximate(&user_ring, c.approx_epsilon * ring_perimeter(&user_ring));
        let quad = (4..=6).contains(&approx.len()) && is_convex(&approx);
        let shape = clamp_score((1.0 - hu / c.hu_tau) * 100.0);
        let score = clamp_score(if quad { shape * (1.0 + c.quad_bonus) } else { shape });
        debug!(hu, ratio = missing.overlap_ratio, quad, score, "crossing check");

        let (width, height) = user.dimensions();
        FeatureReport {
            score,
            found: true,
            hole_bbox: Some(ring_box(&user_ring)),
            hole_area_frac: ring_area(&user_ring) / (width as f64 * height as f64).max(1.0),
            quad,
            hu_distance: Some(hu),
            ..missing
        }
    }
}

/// Outer border enclosing the most area.
fn largest_ring(mask: &GrayImage) -> Option<Vec<[f64; 2]>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points.iter().map(|p| [p.x as f64, p.y as f64]).collect::<Vec<[f64; 2]>>())
        .max_by(|a, b| ring_area(a).total_cmp(&ring_area(b)))
}

/// The seven Hu invariants of the region a closed polygon encloses.
///
/// Raw moments come from Green's theorem over the polygon edges, so the
/// result does not depend on winding. `None` when the ring encloses no area.
pub fn hu_moments(ring: &[[f64; 2]]) -> Option<[f64; 7]> {
    let ring = open_ring(ring);
    let n = ring.len();
    if n < 3 {
        return None;
    }

    let mut m = [0.0f64; 10];
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[(i + 1) % n];
        let a = xi * yj - xj * yi;
        m[0] += a;
        m[1] += a * (xi + xj);
        m[2] += a * (yi + yj);
        m[3] += a * (xi * xi + xi * xj + xj * xj);
        m[4] += a * (xi * yj + 2.0 * xi * yi + 2.0 * xj * yj + xj * yi);
        m[5] += a * (yi * yi + yi * yj + yj * yj);
        m[6] += a * (xi * xi * xi + xi * xi * xj + xi * xj * xj + xj * xj * xj);
        m[7] += a * (xi * xi * (3.0 * yi + yj) + 2.0 * xi * xj * (yi + yj) + xj * xj * (yi + 3.0 * yj));
        m[8] += a * (yi * yi * (3.0 * xi + xj) + 2.0 * yi * yj * (xi + xj) + yj * yj * (xi + 3.0 * xj));
        m[9] += a * (yi * yi * yi + yi * yi * yj + yi * yj * yj + yj * yj * yj);
    }
    let sign = if m[0] < 0.0 { -1.0 } else { 1.0 };
    let [m00, m10, m01, m20, m11, m02, m30, m21, m12, m03] = [
        m[0] / 2.0,
        m[1] / 6.0,
        m[2] / 6.0,
        m[3] / 12.0,
        m[4] / 24.0,
        m[5] / 12.0,
        m[6] / 20.0,
        m[7] / 60.0,
        m[8] / 60.0,
        m[9] / 20.0,
    ]
    .map(|v| v * sign);
    if m00 <= f64::EPSILON {
        return None;
    }

    let (cx, cy) = (m10 / m00, m01 / m00);
    let mu20 = m20 - cx * m10;
    let mu02 = m02 - cy * m01;
    let mu11 = m11 - cx * m01;
    let mu30 = m30 - 3.0 * cx * m20 + 2.0 * cx * cx * m10;
    let mu03 = m03 - 3.0 * cy * m02 + 2.0 * cy * cy * m01;
    let mu21 = m21 - 2.0 * cx * m11 - cy * m20 + 2.0 * cx * cx * m01;
    let mu12 = m12 - 2.0 * cy * m11 - cx * m02 + 2.0 * cy * cy * m10;

    let s2 = m00 * m00;
    let s3 = s2 * m00.sqrt();
    let (n20, n02, n11) = (mu20 / s2, mu02 / s2, mu11 / s2);
    let (n30, n03, n21, n12) = (mu30 / s3, mu03 / s3, mu21 / s3, mu12 / s3);

    let (p, q) = (n30 + n12, n21 + n03);
    let (r, t) = (n30 - 3.0 * n12, 3.0 * n21 - n03);
    Some([
        n20 + n02,
        (n20 - n02).powi(2) + 4.0 * n11 * n11,
        r * r + t * t,
        p * p + q * q,
        r * p * (p * p - 3.0 * q * q) + t * q * (3.0 * p * p - q * q),
        (n20 - n02) * (p * p - q * q) + 4.0 * n11 * p * q,
        t * p * (p * p - 3.0 * q * q) - r * q * (3.0 * p * p - q * q),
    ])
}

/// Sum over the invariants both shapes carry of `|1/mA - 1/mB|`, with
/// `m = sign(h)·log10|h|`. Zero for identical shapes.
pub fn hu_match(a: &[f64; 7], b: &[f64; 7]) -> f64 {
    a.iter()
        .zip(b)
        .filter(|(ha, hb)| ha.abs() > HU_EPSILON && hb.abs() > HU_EPSILON)
        .map(|(ha, hb)| {
            let ma = ha.signum() * ha.abs().log10();
            let mb = hb.signum() * hb.abs().log10();
            (1.0 / ma - 1.0 / mb).abs()
        })
        .sum()
}

/// Hu distance between two rings, `None` when either encloses no area.
pub fn hu_distance(a: &[[f64; 2]], b: &[[f64; 2]]) -> Option<f64> {
    Some(hu_match(&hu_moments(a)?, &hu_moments(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::extraction::paper;
    use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    const SQUARE: [[f64; 2]; 4] = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];

    fn crossing_outlines() -> GrayImage {
        let mut canvas = paper(128, 128);
        for inset in 0..3 {
            let (w, h) = (52 - 2 * inset as u32, 60 - 2 * inset as u32);
            draw_hollow_rect_mut(&mut canvas, Rect::at(24 + inset, 34 + inset).of_size(w, h), Luma([0]));
            draw_hollow_rect_mut(&mut canvas, Rect::at(52 + inset, 34 + inset).of_size(w, h), Luma([0]));
        }
        canvas
    }

    #[test]
    fn square_invariants() {
        let hu = hu_moments(&SQUARE).expect("Should have area");
        assert!((hu[0] - 1.0 / 6.0).abs() < 1e-12);
        assert!(hu[1..].iter().all(|h| h.abs() < 1e-12));
    }

    #[test]
    fn invariants_ignore_position_scale_and_rotation() {
        let moved: Vec<[f64; 2]> = SQUARE.iter().map(|&[x, y]| [3.0 * x + 40.0, 3.0 * y + 7.0]).collect();
        let diamond = [[5.0, 0.0], [10.0, 5.0], [5.0, 10.0], [0.0, 5.0]];
        let clockwise: Vec<[f64; 2]> = SQUARE.iter().rev().copied().collect();
        let others: [&[[f64; 2]]; 3] = [&moved, &diamond, &clockwise];
        for other in others {
            let distance = hu_distance(&SQUARE, other).expect("Should have area");
            assert!(distance < 1e-9, "distance {distance}");
        }
    }

    #[test]
    fn triangle_differs_from_square() {
        let triangle = [[0.0, 0.0], [10.0, 0.0], [5.0, 8.660254]];
        let distance = hu_distance(&triangle, &SQUARE).expect("Should have area");
        assert!((distance - 0.112).abs() < 0.005, "distance {distance}");
        assert_eq!(hu_distance(&[[0.0, 0.0], [5.0, 5.0], [10.0, 10.0]], &SQUARE), None);
    }

    #[test]
    fn identical_crossings_score_full_marks() {
        let canvas = crossing_outlines();
        let report = CrossingScorer::default().score(&canvas, &canvas);
        assert_eq!(report.kind, FeatureKind::Crossing);
        assert!(report.found);
        assert!(report.score >= 99.0, "score {}", report.score);
        assert_eq!(report.hu_distance, Some(0.0));
        assert!(report.overlap_ratio >= 0.05);
        assert!(report.waist_row >= 38 && report.waist_row < 89);
    }

    #[test]
    fn blank_user_has_no_crossing() {
        let report = CrossingScorer::default().score(&paper(128, 128), &crossing_outlines());
        assert!(!report.found);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.hu_distance, None);
    }

    #[test]
    fn drawing_above_the_waist_has_no_crossing() {
        let mut user = paper(128, 128);
        draw_filled_rect_mut(&mut user, Rect::at(30, 5).of_size(60, 24), Luma([0]));
        let scorer = CrossingScorer::default();
        assert!(scorer.split(&user).is_none());

        let report = scorer.score(&user, &crossing_outlines());
        assert!(!report.found);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn different_band_shapes_score_lower() {
        let target = crossing_outlines();
        let mut user = paper(128, 128);
        draw_filled_rect_mut(&mut user, Rect::at(20, 30).of_size(90, 70), Luma([0]));

        let scorer = CrossingScorer::default();
        let same = scorer.score(&target, &target);
        let other = scorer.score(&user, &target);
        assert!(other.found);
        assert!(other.hu_distance.is_some_and(|hu| hu > 0.1));
        assert!(other.score < same.score, "{} vs {}", other.score, same.score);
    }

    #[test]
    fn split_band_follows_the_margin() {
        let split = CrossingScorer::default().split(&crossing_outlines()).expect("Should split");
        assert_eq!(split.band, [split.row - 4, split.row + 4]);
        assert!(split.shared_pixels > 0);
        assert!(split.base > split.shared_pixels);
    }
}
