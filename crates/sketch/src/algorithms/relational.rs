use tracing::debug;

use crate::{
    algorithms::simplification::distance,
    config::MatchConfig,
    report::{clamp_score, GeometryAxes, GeometryReport, MatchedPair},
    types::{ShapeDescriptor, ShapeKind, ShapeSet},
};

/// Weighted per-axis costs of pairing one user shape with one target shape.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairCost {
    pub type_match: f64,
    pub orientation: f64,
    pub area: f64,
    pub aspect: f64,
    pub vertex: f64,
}

impl PairCost {
    pub fn total(&self) -> f64 {
        self.type_match + self.orientation + self.area + self.aspect + self.vertex
    }
}

/// Pairs user shapes to target shapes and scores their structural agreement
#[derive(Debug, Clone, Default)]
pub struct RelationalMatcher {
    pub config: MatchConfig,
}

impl RelationalMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn pair_cost(&self, user: &ShapeDescriptor, user_canvas: f64, target: &ShapeDescriptor, target_canvas: f64) -> PairCost {
        let c = &self.config;
        let type_mismatch = user.kind != target.kind;
        let orientation_mismatch = user.kind == ShapeKind::Triangle
            && target.kind == ShapeKind::Triangle
            && user.orientation != target.orientation;
        PairCost {
            type_match: if type_mismatch { c.type_weight } else { 0.0 },
            orientation: if orientation_mismatch { c.orientation_weight } else { 0.0 },
            area: c.area_weight * relative_difference(user.area / user_canvas, target.area / target_canvas),
            aspect: c.aspect_weight * relative_difference(user.aspect_ratio, target.aspect_ratio),
            vertex: c.vertex_weight * relative_difference(user.vertex_count as f64, target.vertex_count as f64),
        }
    }

    /// Greedy minimum-cost assignment: cheapest pairs first, each shape used once.
    ///
    /// Equal costs keep (user, target) index order.
    pub fn greedy_match(&self, user: &ShapeSet, target: &ShapeSet) -> Vec<(MatchedPair, PairCost)> {
        let (user_canvas, target_canvas) = (user.canvas_area(), target.canvas_area());
        let mut candidates = Vec::with_capacity(user.len() * target.len());
        for (u, user_shape) in user.shapes.iter().enumerate() {
            for (t, target_shape) in target.shapes.iter().enumerate() {
                let cost = self.pair_cost(user_shape, user_canvas, target_shape, target_canvas);
                candidates.push((u, t, cost));
            }
        }
        candidates.sort_by(|a, b| a.2.total().total_cmp(&b.2.total()));

        let mut user_taken = vec![false; user.len()];
        let mut target_taken = vec![false; target.len()];
        let mut accepted = Vec::new();
        for (u, t, cost) in candidates {
            if user_taken[u] || target_taken[t] {
                continue;
            }
            user_taken[u] = true;
            target_taken[t] = true;
            accepted.push((
                MatchedPair {
                    user: u,
                    target: t,
                    cost: cost.total(),
                },
                cost,
            ));
        }
        accepted
    }

    pub fn score(&self, user: &ShapeSet, target: &ShapeSet) -> GeometryReport {
        let c = &self.config;
        let (user_count, target_count) = (user.len(), target.len());
        let count_ratio = if user_count.max(target_count) == 0 {
            0.0
        } else {
            user_count.min(target_count) as f64 / user_count.max(target_count) as f64
        };
        let user_max_overlap = user.overlap.max_overlap();
        let target_max_overlap = target.overlap.max_overlap();
        let missed_overlap = target_max_overlap > c.overlap_threshold && user_max_overlap < c.user_overlap_floor;

        if user.is_empty() || target.is_empty() {
            debug!(user_count, target_count, "no shapes on one side, geometric score is zero");
            return GeometryReport {
                score: 0.0,
                total_cost: c.count_penalty * user_count.abs_diff(target_count) as f64,
                user_shapes: user_count,
                target_shapes: target_count,
                pairs: Vec::new(),
                count_ratio,
                type_match_ratio: 0.0,
                axes: GeometryAxes::default(),
                user_max_overlap,
                target_max_overlap,
                missed_overlap,
                degenerate: true,
            };
        }

        let matched = self.greedy_match(user, target);
        let mut shape_cost = PairCost::default();
        for (_, cost) in &matched {
            shape_cost.type_match += cost.type_match;
            shape_cost.orientation += cost.orientation;
            shape_cost.area += cost.area;
            shape_cost.aspect += cost.aspect;
            shape_cost.vertex += cost.vertex;
        }
        let type_matched = matched
            .iter()
            .filter(|(pair, _)| user.shapes[pair.user].kind == target.shapes[pair.target].kind)
            .count();

        let count_cost = c.count_penalty * user_count.abs_diff(target_count) as f64;

        let mut layout_sum = 0.0;
        let mut overlap_diff = 0.0;
        let mut overlap_flags = 0usize;
        for (a, (p, _)) in matched.iter().enumerate() {
            for (q, _) in &matched[a + 1..] {
                let du = distance(user.shapes[p.user].centroid, user.shapes[q.user].centroid);
                let dt = distance(target.shapes[p.target].centroid, target.shapes[q.target].centroid);
                layout_sum += (du - dt).abs();

                let ou = user.overlap.get(p.user, q.user);
                let ot = target.overlap.get(p.target, q.target);
                overlap_diff += (ou - ot).abs();
                if (ou > c.overlap_threshold) != (ot > c.overlap_threshold) {
                    overlap_flags += 1;
                }
            }
        }
        let layout_cost = c.layout_weight * layout_sum;
        let mut overlap_cost = c.overlap_weight * overlap_diff + c.overlap_flag_weight * overlap_flags as f64;
        if missed_overlap {
            overlap_cost += c.missed_overlap_penalty;
        }

        let total_cost = shape_cost.total() + count_cost + layout_cost + overlap_cost;
        let axis = |cost: f64| clamp_score(100.0 - c.k * cost);
        let axes = GeometryAxes {
            type_match: axis(shape_cost.type_match),
            orientation: axis(shape_cost.orientation),
            area: axis(shape_cost.area),
            aspect: axis(shape_cost.aspect),
            vertex: axis(shape_cost.vertex),
            count: axis(count_cost),
            layout: axis(layout_cost),
            overlap: axis(overlap_cost),
        };
        let score = axis(total_cost);
        debug!(
            matched = matched.len(),
            total_cost,
            score,
            missed_overlap,
            "relational match"
        );

        GeometryReport {
            score,
            total_cost,
            user_shapes: user_count,
            target_shapes: target_count,
            pairs: matched.into_iter().map(|(pair, _)| pair).collect(),
            count_ratio,
            type_match_ratio: type_matched as f64 / target_count as f64,
            axes,
            user_max_overlap,
            target_max_overlap,
            missed_overlap,
            degenerate: false,
        }
    }
}

/// |a - b| / max(a, b), 0 when both are zero.
fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale <= f64::EPSILON { 0.0 } else { ((a - b).abs() / scale).min(1.0) }
}
