use std::sync::Arc;

use tracing::debug;

use crate::{
    config::{CombinePolicy, FeatureKind, HybridPolicy, ScoringConfig},
    report::{clamp_score, GateKind},
    traits::{Combination, Requirements, ScoreCombiner, SubScores},
};

/// Weighted blend of boundary, geometric and texture scores followed by ceiling gates
#[derive(Debug, Clone, Default)]
pub struct HybridCombiner {
    pub policy: HybridPolicy,
    pub texture_enabled: bool,
}

impl HybridCombiner {
    pub fn new(policy: HybridPolicy, texture_enabled: bool) -> Self {
        Self {
            policy,
            texture_enabled,
        }
    }

    fn blend(&self, scores: &SubScores<'_>) -> f64 {
        let p = &self.policy;
        let geometric = scores.geometry.map_or(0.0, |g| g.score);
        let mut weighted = p.boundary_weight * scores.boundary.score + p.geometric_weight * geometric;
        let mut total = p.boundary_weight + p.geometric_weight;
        if self.texture_enabled {
            weighted += p.texture_weight * scores.texture.map_or(0.0, |t| t.score);
            total += p.texture_weight;
        }
        if total > 0.0 { weighted / total } else { 0.0 }
    }

    /// Gates whose condition holds, in evaluation order.
    fn fired_gates(&self, scores: &SubScores<'_>) -> Vec<(GateKind, f64)> {
        let g = &self.policy.gates;
        let mut fired = Vec::new();
        let (count_ratio, type_ratio, missed) = match scores.geometry {
            Some(geo) => (
                geo.count_ratio,
                geo.type_match_ratio,
                geo.target_max_overlap > g.overlap_target_min && geo.user_max_overlap < g.overlap_user_max,
            ),
            None => (0.0, 0.0, false),
        };
        if count_ratio < g.count_ratio_min {
            fired.push((GateKind::CountRatio, g.count_cap));
        }
        if type_ratio < g.type_ratio_min {
            fired.push((GateKind::TypeMatch, g.type_cap));
        }
        if missed {
            fired.push((GateKind::MissedOverlap, g.overlap_cap));
        }
        if scores.boundary.iou < g.iou_min {
            fired.push((GateKind::Iou, g.iou_cap));
        }
        fired
    }
}

impl ScoreCombiner for HybridCombiner {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            geometry: true,
            texture: self.texture_enabled,
            feature: None,
        }
    }

    fn combine(&self, scores: &SubScores<'_>) -> Combination {
        let combined = clamp_score(self.blend(scores));
        let fired = self.fired_gates(scores);
        let score = fired.iter().fold(combined, |score, (_, cap)| score.min(*cap));
        if !fired.is_empty() {
            debug!(combined, score, gates = ?fired, "ceiling gates applied");
        }
        Combination {
            combined,
            score,
            gates: fired.into_iter().map(|(gate, _)| gate).collect(),
        }
    }
}

/// Boundary score scaled down when the intersection feature looks absent
#[derive(Debug, Clone)]
pub struct ThresholdPenaltyCombiner {
    pub min: f64,
    pub low_factor: f64,
    pub feature: FeatureKind,
}

impl ScoreCombiner for ThresholdPenaltyCombiner {
    fn name(&self) -> &'static str {
        "threshold_penalty"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            feature: Some(self.feature),
            ..Requirements::default()
        }
    }

    fn combine(&self, scores: &SubScores<'_>) -> Combination {
        let feature = scores.feature.map_or(0.0, |f| f.score);
        let factor = if feature < self.min { self.low_factor } else { 1.0 };
        let combined = clamp_score(scores.boundary.score * factor);
        Combination {
            combined,
            score: combined,
            gates: Vec::new(),
        }
    }
}

/// Boundary blended with the intersection feature when it exists, penalized otherwise
#[derive(Debug, Clone)]
pub struct FeatureBlendCombiner {
    pub boundary_weight: f64,
    pub exist_threshold: f64,
    pub no_feature_factor: f64,
    pub feature: FeatureKind,
}

impl ScoreCombiner for FeatureBlendCombiner {
    fn name(&self) -> &'static str {
        "feature_blend"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            feature: Some(self.feature),
            ..Requirements::default()
        }
    }

    fn combine(&self, scores: &SubScores<'_>) -> Combination {
        let boundary = scores.boundary.score;
        let feature = scores.feature.map_or(0.0, |f| f.score);
        let raw = if feature >= self.exist_threshold {
            self.boundary_weight * boundary + (1.0 - self.boundary_weight) * feature
        } else {
            boundary * self.no_feature_factor
        };
        let combined = clamp_score(raw);
        Combination {
            combined,
            score: combined,
            gates: Vec::new(),
        }
    }
}

/// Build the combiner selected by the configuration.
pub fn build_combiner(config: &ScoringConfig) -> Arc<dyn ScoreCombiner> {
    match &config.policy {
        CombinePolicy::Hybrid(policy) => Arc::new(HybridCombiner::new(policy.clone(), config.texture.enabled)),
        CombinePolicy::ThresholdPenalty { min, low_factor, feature } => Arc::new(ThresholdPenaltyCombiner {
            min: *min,
            low_factor: *low_factor,
            feature: *feature,
        }),
        CombinePolicy::FeatureBlend {
            boundary_weight,
            exist_threshold,
            no_feature_factor,
            feature,
        } => Arc::new(FeatureBlendCombiner {
            boundary_weight: *boundary_weight,
            exist_threshold: *exist_threshold,
            no_feature_factor: *no_feature_factor,
            feature: *feature,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{BoundaryReport, FeatureReport, GeometryAxes, GeometryReport, TextureReport};

    fn boundary(score: f64, iou: f64) -> BoundaryReport {
        BoundaryReport {
            score,
            d_ab: 0.0,
            d_ba: 0.0,
            avg_d: 0.0,
            best_scale: 1.0,
            iou,
            degenerate: false,
            samples: Vec::new(),
        }
    }

    fn geometry(score: f64, count_ratio: f64, type_ratio: f64) -> GeometryReport {
        GeometryReport {
            score,
            total_cost: 0.0,
            user_shapes: 4,
            target_shapes: 4,
            pairs: Vec::new(),
            count_ratio,
            type_match_ratio: type_ratio,
            axes: GeometryAxes::default(),
            user_max_overlap: 0.0,
            target_max_overlap: 0.0,
            missed_overlap: false,
            degenerate: false,
        }
    }

    fn feature(score: f64) -> FeatureReport {
        FeatureReport {
            score,
            ..FeatureReport::missing(FeatureKind::Crossing, 64, [51, 77])
        }
    }

    #[test]
    fn hybrid_blends_without_gates() {
        let b = boundary(80.0, 0.5);
        let g = geometry(100.0, 1.0, 1.0);
        let scores = SubScores { boundary: &b, geometry: Some(&g), texture: None, feature: None };
        let result = HybridCombiner::default().combine(&scores);
        assert_eq!(result.combined, 90.0);
        assert_eq!(result.score, 90.0);
        assert!(result.gates.is_empty());
    }

    #[test]
    fn texture_weight_only_counts_when_enabled() {
        let b = boundary(100.0, 0.5);
        let g = geometry(100.0, 1.0, 1.0);
        let t = TextureReport { score: 0.0, chi_squared: 1.0, words: 4 };
        let scores = SubScores { boundary: &b, geometry: Some(&g), texture: Some(&t), feature: None };
        assert_eq!(HybridCombiner::default().combine(&scores).score, 100.0);
        let with_texture = HybridCombiner::new(HybridPolicy::default(), true).combine(&scores);
        assert!((with_texture.score - 100.0 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn gates_only_lower_the_score() {
        let b = boundary(100.0, 0.5);
        let g = geometry(100.0, 0.5, 1.0);
        let scores = SubScores { boundary: &b, geometry: Some(&g), texture: None, feature: None };
        let result = HybridCombiner::default().combine(&scores);
        assert_eq!(result.combined, 100.0);
        assert_eq!(result.score, 55.0);
        assert_eq!(result.gates, vec![GateKind::CountRatio]);

        let low = boundary(20.0, 0.01);
        let g = geometry(20.0, 1.0, 0.25);
        let scores = SubScores { boundary: &low, geometry: Some(&g), texture: None, feature: None };
        let result = HybridCombiner::default().combine(&scores);
        assert_eq!(result.score, 20.0);
        assert_eq!(result.gates, vec![GateKind::TypeMatch, GateKind::Iou]);
    }

    #[test]
    fn missed_overlap_gate_caps_at_65() {
        let b = boundary(90.0, 0.5);
        let mut g = geometry(90.0, 1.0, 1.0);
        g.target_max_overlap = 0.6;
        g.user_max_overlap = 0.0;
        let scores = SubScores { boundary: &b, geometry: Some(&g), texture: None, feature: None };
        let result = HybridCombiner::default().combine(&scores);
        assert_eq!(result.score, 65.0);
        assert_eq!(result.gates, vec![GateKind::MissedOverlap]);
    }

    #[test]
    fn threshold_penalty_scales_boundary() {
        let combiner = build_combiner(&ScoringConfig {
            policy: CombinePolicy::threshold_penalty(),
            ..ScoringConfig::default()
        });
        assert_eq!(combiner.name(), "threshold_penalty");
        assert_eq!(combiner.requirements().feature, Some(FeatureKind::Crossing));
        assert!(!combiner.requirements().geometry);

        let b = boundary(80.0, 0.5);
        let weak = feature(10.0);
        let strong = feature(40.0);
        let low = combiner.combine(&SubScores { boundary: &b, geometry: None, texture: None, feature: Some(&weak) });
        let high = combiner.combine(&SubScores { boundary: &b, geometry: None, texture: None, feature: Some(&strong) });
        assert!((low.score - 48.0).abs() < 1e-9);
        assert_eq!(high.score, 80.0);
        assert!(low.gates.is_empty());
    }

    #[test]
    fn feature_blend_follows_existence() {
        let combiner = build_combiner(&ScoringConfig {
            policy: CombinePolicy::feature_blend(),
            ..ScoringConfig::default()
        });
        assert_eq!(combiner.requirements().feature, Some(FeatureKind::Loop));
        let b = boundary(80.0, 0.5);
        let present = feature(50.0);
        let absent = feature(5.0);
        let blended = combiner.combine(&SubScores { boundary: &b, geometry: None, texture: None, feature: Some(&present) });
        let penalized = combiner.combine(&SubScores { boundary: &b, geometry: None, texture: None, feature: Some(&absent) });
        assert!((blended.score - 68.0).abs() < 1e-9);
        assert!((penalized.score - 44.0).abs() < 1e-9);
    }

    #[test]
    fn hybrid_needs_no_feature() {
        assert_eq!(HybridCombiner::default().requirements().feature, None);
        let combiner = build_combiner(&ScoringConfig {
            policy: CombinePolicy::ThresholdPenalty {
                min: 30.0,
                low_factor: 0.6,
                feature: FeatureKind::Loop,
            },
            ..ScoringConfig::default()
        });
        assert_eq!(combiner.requirements().feature, Some(FeatureKind::Loop));
    }
}
