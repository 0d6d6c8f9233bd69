use image::GrayImage;
use imageproc::distance_transform::euclidean_squared_distance_transform;
use tracing::{debug, trace, warn};

use crate::{
    algorithms::{extraction::ModeExtractor, normalize::place_at_scale},
    config::ScoringConfig,
    error::Result,
    report::{clamp_score, BoundaryReport, ScaleSample},
    traits::StrokeExtractor,
    types::BinaryMap,
};

/// Euclidean distance from every pixel to the nearest foreground pixel of a map.
#[derive(Debug, Clone)]
pub struct DistanceField {
    width: u32,
    distances: Vec<f64>,
    empty: bool,
}

impl DistanceField {
    pub fn of(map: &BinaryMap) -> Self {
        if map.is_blank() {
            return Self {
                width: map.width(),
                distances: Vec::new(),
                empty: true,
            };
        }
        let squared = euclidean_squared_distance_transform(map.as_image());
        Self {
            width: map.width(),
            distances: squared.pixels().map(|p| p.0[0].sqrt()).collect(),
            empty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Distance at a pixel, infinite when the source map had no foreground.
    pub fn at(&self, x: u32, y: u32) -> f64 {
        if self.empty {
            return f64::INFINITY;
        }
        self.distances[(y * self.width + x) as usize]
    }
}

/// Mean capped distance from the foreground of `a` to the map behind `field`.
///
/// Either side being empty yields the cap.
pub fn chamfer_mean(a: &BinaryMap, field: &DistanceField, tau: f64) -> f64 {
    if field.is_empty() {
        return tau;
    }
    let (mut sum, mut count) = (0.0f64, 0usize);
    for (x, y, pixel) in a.as_image().enumerate_pixels() {
        if pixel.0[0] != 0 {
            sum += field.at(x, y).min(tau);
            count += 1;
        }
    }
    if count == 0 { tau } else { sum / count as f64 }
}

/// Directional distances and their mean for two maps of equal size.
pub fn bidirectional_distance(a: &BinaryMap, b: &BinaryMap, tau: f64) -> (f64, f64, f64) {
    let d_ab = chamfer_mean(a, &DistanceField::of(b), tau);
    let d_ba = chamfer_mean(b, &DistanceField::of(a), tau);
    (d_ab, d_ba, 0.5 * (d_ab + d_ba))
}

/// Map an averaged distance to [0, 100].
pub fn distance_score(avg: f64, tau: f64) -> f64 {
    clamp_score((1.0 - avg / tau) * 100.0)
}

struct ScanStep {
    scale: f64,
    d_ab: f64,
    d_ba: f64,
    avg_d: f64,
    user_map: BinaryMap,
}

/// Multi-scale registration scan with the bidirectional boundary distance
#[derive(Debug, Clone)]
pub struct BoundaryScorer {
    pub strokes: ModeExtractor,
    pub side: u32,
    pub tau: f64,
    pub scales: Vec<f64>,
}

impl Default for BoundaryScorer {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl BoundaryScorer {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            strokes: ModeExtractor::from_config(config),
            side: config.side,
            tau: config.tau,
            scales: config.scales(),
        }
    }

    /// Scan the user canvas across all scales against a fixed target canvas.
    pub fn score(&self, user: &GrayImage, target: &GrayImage) -> Result<BoundaryReport> {
        let target_map = self.strokes.extract(target)?;
        let target_field = DistanceField::of(&target_map);
        if target_map.is_blank() {
            warn!("target canvas has no strokes");
        }

        let mut samples = Vec::with_capacity(self.scales.len());
        let mut best: Option<ScanStep> = None;
        for &scale in &self.scales {
            let placed = place_at_scale(user, self.side, scale);
            let user_map = self.strokes.extract(&placed)?;
            let d_ab = chamfer_mean(&user_map, &target_field, self.tau);
            let d_ba = chamfer_mean(&target_map, &DistanceField::of(&user_map), self.tau);
            let avg = 0.5 * (d_ab + d_ba);
            trace!(scale, d_ab, d_ba, avg, "scan step");
            samples.push(ScaleSample { scale, avg_d: avg });

            let better = best.as_ref().is_none_or(|step| avg < step.avg_d);
            if better {
                best = Some(ScanStep { scale, d_ab, d_ba, avg_d: avg, user_map });
            }
        }

        let Some(ScanStep { scale: best_scale, d_ab, d_ba, avg_d, user_map }) = best else {
            return Ok(self.degenerate_report(samples));
        };
        let degenerate = user_map.is_blank() || target_map.is_blank();
        if degenerate {
            warn!("blank canvas, boundary score is zero");
        }
        let score = if degenerate { 0.0 } else { distance_score(avg_d, self.tau) };
        let iou = user_map.iou(&target_map);
        debug!(best_scale, avg_d, score, iou, "boundary scan done");

        Ok(BoundaryReport {
            score,
            d_ab,
            d_ba,
            avg_d,
            best_scale,
            iou,
            degenerate,
            samples,
        })
    }

    fn degenerate_report(&self, samples: Vec<ScaleSample>) -> BoundaryReport {
        BoundaryReport {
            score: 0.0,
            d_ab: self.tau,
            d_ba: self.tau,
            avg_d: self.tau,
            best_scale: 1.0,
            iou: 0.0,
            degenerate: true,
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::extraction::paper;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn map_with_rect(x: i32, y: i32, w: u32, h: u32) -> BinaryMap {
        let mut image = GrayImage::new(40, 40);
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), Luma([255]));
        BinaryMap::from_mask(image)
    }

    #[test]
    fn identical_maps_have_zero_distance() {
        let a = map_with_rect(5, 5, 10, 10);
        let (d_ab, d_ba, avg) = bidirectional_distance(&a, &a, 8.0);
        assert_eq!((d_ab, d_ba, avg), (0.0, 0.0, 0.0));
        assert_eq!(distance_score(avg, 8.0), 100.0);
    }

    #[test]
    fn shifted_maps_measure_the_offset() {
        let a = map_with_rect(5, 5, 1, 20);
        let b = map_with_rect(8, 5, 1, 20);
        let (d_ab, d_ba, avg) = bidirectional_distance(&a, &b, 8.0);
        assert!((d_ab - 3.0).abs() < 1e-9);
        assert!((d_ba - 3.0).abs() < 1e-9);
        assert!((distance_score(avg, 8.0) - 62.5).abs() < 1e-9);
    }

    #[test]
    fn distances_are_capped_by_tau() {
        let a = map_with_rect(0, 0, 2, 2);
        let b = map_with_rect(30, 30, 2, 2);
        let (_, _, avg) = bidirectional_distance(&a, &b, 4.0);
        assert_eq!(avg, 4.0);
        assert_eq!(distance_score(avg, 4.0), 0.0);
    }

    #[test]
    fn empty_side_yields_cap() {
        let a = map_with_rect(5, 5, 10, 10);
        let blank = BinaryMap::blank(40, 40);
        assert_eq!(bidirectional_distance(&a, &blank, 8.0), (8.0, 8.0, 8.0));
        assert_eq!(bidirectional_distance(&blank, &blank, 8.0), (8.0, 8.0, 8.0));
    }

    #[test]
    fn scan_prefers_earliest_scale_on_ties() {
        let mut canvas = paper(128, 128);
        draw_filled_rect_mut(&mut canvas, Rect::at(40, 40).of_size(48, 48), Luma([0]));
        let scorer = BoundaryScorer {
            scales: vec![1.0, 1.0, 1.0],
            ..BoundaryScorer::default()
        };
        let report = scorer.score(&canvas, &canvas).expect("Should score");
        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.best_scale, 1.0);
        assert!(report.score >= 99.0);
        assert!(report.iou > 0.99);
        assert!(!report.degenerate);
    }

    #[test]
    fn blank_user_is_degenerate() {
        let mut target = paper(128, 128);
        draw_filled_rect_mut(&mut target, Rect::at(40, 40).of_size(48, 48), Luma([0]));
        let report = BoundaryScorer::default()
            .score(&paper(128, 128), &target)
            .expect("Should score");
        assert!(report.degenerate);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.avg_d, 8.0);
    }
}
