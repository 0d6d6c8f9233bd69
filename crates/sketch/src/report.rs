//! Scoring results and the diagnostics attached to them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{config::FeatureKind, types::PixelBox};

/// Clamp into [0, 100]; NaN reads as the lowest score.
pub(crate) fn clamp_score(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

pub(crate) fn round_score(value: f64) -> u8 {
    clamp_score(value).round() as u8
}

/// Distance recorded for one step of the registration scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScaleSample {
    pub scale: f64,
    pub avg_d: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundaryReport {
    pub score: f64,
    /// Mean capped distance from user strokes to target strokes
    pub d_ab: f64,
    /// Mean capped distance from target strokes to user strokes
    pub d_ba: f64,
    pub avg_d: f64,
    pub best_scale: f64,
    /// Whole-canvas IoU of the stroke maps at the chosen scale
    pub iou: f64,
    /// One side had no strokes at all
    pub degenerate: bool,
    pub samples: Vec<ScaleSample>,
}

/// Accepted pair of the greedy matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchedPair {
    pub user: usize,
    pub target: usize,
    pub cost: f64,
}

/// Per-axis scores of the relational matcher, each `100 - k·cost` clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeometryAxes {
    pub type_match: f64,
    pub orientation: f64,
    pub area: f64,
    pub aspect: f64,
    pub vertex: f64,
    pub count: f64,
    pub layout: f64,
    pub overlap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeometryReport {
    pub score: f64,
    pub total_cost: f64,
    pub user_shapes: usize,
    pub target_shapes: usize,
    pub pairs: Vec<MatchedPair>,
    /// min/max of the two shape counts
    pub count_ratio: f64,
    /// Type-matched pairs over the target shape count
    pub type_match_ratio: f64,
    pub axes: GeometryAxes,
    pub user_max_overlap: f64,
    pub target_max_overlap: f64,
    pub missed_overlap: bool,
    pub degenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextureReport {
    pub score: f64,
    pub chi_squared: f64,
    pub words: usize,
}

/// Result of an intersection sub-feature.
///
/// `hole_*`, `flatness` and `center_distance` describe the loop found by the
/// loop check; `overlap_ratio` and `hu_distance` belong to the crossing check.
/// `hole_bbox` bounds whichever region was scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureReport {
    pub kind: FeatureKind,
    pub score: f64,
    pub found: bool,
    pub waist_row: u32,
    pub band: [u32; 2],
    pub hole_bbox: Option<PixelBox>,
    pub hole_area_frac: f64,
    pub flatness: f64,
    pub quad: bool,
    pub center_distance: f64,
    /// Shared band area over the smaller half of the user figure
    pub overlap_ratio: f64,
    /// Hu-moment distance between the user and target crossing regions
    pub hu_distance: Option<f64>,
}

impl FeatureReport {
    pub(crate) fn missing(kind: FeatureKind, waist_row: u32, band: [u32; 2]) -> Self {
        Self {
            kind,
            score: 0.0,
            found: false,
            waist_row,
            band,
            hole_bbox: None,
            hole_area_frac: 0.0,
            flatness: 0.0,
            quad: false,
            center_distance: 0.0,
            overlap_ratio: 0.0,
            hu_distance: None,
        }
    }
}

/// Ceiling rules of the hybrid policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateKind {
    CountRatio,
    TypeMatch,
    MissedOverlap,
    Iou,
}

/// Flat named value, in the order the details were produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportMetric {
    pub name: &'static str,
    pub value: f64,
}

impl ReportMetric {
    pub fn new(name: &'static str, value: f64) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreDetails {
    pub policy: String,
    pub boundary: BoundaryReport,
    pub geometry: Option<GeometryReport>,
    pub texture: Option<TextureReport>,
    pub feature: Option<FeatureReport>,
    /// Policy output before gates
    pub combined: f64,
    pub gates: Vec<GateKind>,
}

impl ScoreDetails {
    pub fn metrics(&self) -> Vec<ReportMetric> {
        let b = &self.boundary;
        let mut metrics = vec![
            ReportMetric::new("boundary_score", b.score),
            ReportMetric::new("d_ab", b.d_ab),
            ReportMetric::new("d_ba", b.d_ba),
            ReportMetric::new("avg_d", b.avg_d),
            ReportMetric::new("best_scale", b.best_scale),
            ReportMetric::new("iou", b.iou),
        ];
        if let Some(g) = &self.geometry {
            metrics.extend([
                ReportMetric::new("user_shapes", g.user_shapes as f64),
                ReportMetric::new("target_shapes", g.target_shapes as f64),
                ReportMetric::new("matched", g.pairs.len() as f64),
                ReportMetric::new("count_ratio", g.count_ratio),
                ReportMetric::new("type_match_ratio", g.type_match_ratio),
                ReportMetric::new("geometric_score", g.score),
                ReportMetric::new("geo_type", g.axes.type_match),
                ReportMetric::new("geo_orientation", g.axes.orientation),
                ReportMetric::new("geo_area", g.axes.area),
                ReportMetric::new("geo_aspect", g.axes.aspect),
                ReportMetric::new("geo_vertex", g.axes.vertex),
                ReportMetric::new("geo_count", g.axes.count),
                ReportMetric::new("geo_layout", g.axes.layout),
                ReportMetric::new("geo_overlap", g.axes.overlap),
            ]);
        }
        if let Some(t) = &self.texture {
            metrics.push(ReportMetric::new("texture_score", t.score));
        }
        if let Some(f) = &self.feature {
            metrics.push(ReportMetric::new("feature_score", f.score));
            if let Some(hu) = f.hu_distance {
                metrics.push(ReportMetric::new("hu_distance", hu));
            }
        }
        metrics.push(ReportMetric::new("combined", self.combined));
        metrics
    }

    pub fn gate_fired(&self, gate: GateKind) -> bool {
        self.gates.contains(&gate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreResult {
    pub score: u8,
    pub details: ScoreDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_clamp_and_round() {
        assert_eq!(round_score(f64::NAN), 0);
        assert_eq!(round_score(-3.0), 0);
        assert_eq!(round_score(140.0), 100);
        assert_eq!(round_score(54.5), 55);
        assert_eq!(clamp_score(f64::INFINITY), 100.0);
    }

    #[test]
    fn gate_names_are_snake_case() {
        assert_eq!(GateKind::MissedOverlap.to_string(), "missed_overlap");
        let json = serde_json::to_string(&GateKind::CountRatio).expect("Should serialize");
        assert_eq!(json, "\"count_ratio\"");
    }
}
