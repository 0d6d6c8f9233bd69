pub mod builder;
pub mod combine;

use std::borrow::Cow;
use std::sync::Arc;

use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, debug_span};

use crate::{
    algorithms::{
        boundary::BoundaryScorer,
        crossing::CrossingScorer,
        decompose::ShapeDecomposer,
        extraction::ModeExtractor,
        intersection::IntersectionScorer,
        normalize::CanvasNormalizer,
        relational::RelationalMatcher,
        texture::TextureScorer,
    },
    config::{FeatureKind, ScoringConfig},
    error::Result,
    report::{round_score, ScoreDetails, ScoreResult},
    traits::{ScoreCombiner, SubScores},
    types::{RasterImage, ShapeSet},
};

/// A drawing normalized once and reusable against any number of counterparts.
#[derive(Debug, Clone)]
pub struct PreparedDrawing {
    pub canvas: GrayImage,
    /// Present when the active policy needs shape decomposition
    pub shapes: Option<ShapeSet>,
}

/// The full comparison pipeline: normalize, register, decompose, match, combine
pub struct Scorer {
    config: ScoringConfig,
    normalizer: CanvasNormalizer,
    boundary: BoundaryScorer,
    decomposer: ShapeDecomposer,
    matcher: RelationalMatcher,
    texture: TextureScorer,
    intersection: IntersectionScorer,
    crossing: CrossingScorer,
    combiner: Arc<dyn ScoreCombiner>,
}

impl Scorer {
    /// Create a new scorer builder
    pub fn builder() -> builder::ScorerBuilder {
        builder::ScorerBuilder::new()
    }

    /// Validate the configuration and wire up its policy.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        let combiner = combine::build_combiner(&config);
        Self::with_combiner(config, combiner)
    }

    pub fn with_combiner(config: ScoringConfig, combiner: Arc<dyn ScoreCombiner>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: CanvasNormalizer::from_config(&config),
            boundary: BoundaryScorer::from_config(&config),
            decomposer: ShapeDecomposer::new(config.shapes.clone()),
            matcher: RelationalMatcher::new(config.matching.clone()),
            texture: TextureScorer::new(config.texture.clone()),
            intersection: IntersectionScorer::new(ModeExtractor::from_config(&config), config.feature.clone()),
            crossing: CrossingScorer::new(config.feature.clone()),
            combiner,
            config,
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &'static str {
        self.combiner.name()
    }

    pub fn decomposer(&self) -> &ShapeDecomposer {
        &self.decomposer
    }

    /// Normalize a drawing and decompose it when the policy asks for shapes.
    pub fn prepare(&self, raster: &RasterImage) -> Result<PreparedDrawing> {
        let canvas = self.normalizer.normalize(raster)?;
        let shapes = if self.combiner.requirements().geometry {
            Some(self.decomposer.decompose(&canvas)?)
        } else {
            None
        };
        Ok(PreparedDrawing { canvas, shapes })
    }

    /// Compare one user drawing with one target drawing.
    pub fn score(&self, user: &RasterImage, target: &RasterImage) -> Result<ScoreResult> {
        let user = self.prepare(user)?;
        let target = self.prepare(target)?;
        self.score_prepared(&user, &target)
    }

    pub fn score_prepared(&self, user: &PreparedDrawing, target: &PreparedDrawing) -> Result<ScoreResult> {
        let _span = debug_span!("score", policy = self.combiner.name()).entered();
        let requirements = self.combiner.requirements();

        let boundary = self.boundary.score(&user.canvas, &target.canvas)?;
        let geometry = if requirements.geometry {
            let user_shapes = self.shapes_of(user)?;
            let target_shapes = self.shapes_of(target)?;
            Some(self.matcher.score(&user_shapes, &target_shapes))
        } else {
            None
        };
        let texture = requirements
            .texture
            .then(|| self.texture.score(&user.canvas, &target.canvas));
        let feature = match requirements.feature {
            Some(FeatureKind::Loop) => Some(self.intersection.score(&user.canvas, &target.canvas)?),
            Some(FeatureKind::Crossing) => Some(self.crossing.score(&user.canvas, &target.canvas)),
            None => None,
        };

        let combination = self.combiner.combine(&SubScores {
            boundary: &boundary,
            geometry: geometry.as_ref(),
            texture: texture.as_ref(),
            feature: feature.as_ref(),
        });
        let score = round_score(combination.score);
        debug!(score, combined = combination.combined, gates = combination.gates.len(), "scored");

        Ok(ScoreResult {
            score,
            details: ScoreDetails {
                policy: self.combiner.name().to_string(),
                boundary,
                geometry,
                texture,
                feature,
                combined: combination.combined,
                gates: combination.gates,
            },
        })
    }

    /// Score one user drawing against every target in parallel, keeping target order.
    pub fn score_targets(&self, user: &RasterImage, targets: &[RasterImage]) -> Result<Vec<ScoreResult>> {
        let user = self.prepare(user)?;
        targets
            .par_iter()
            .map(|target| {
                let target = self.prepare(target)?;
                self.score_prepared(&user, &target)
            })
            .collect()
    }

    fn shapes_of<'a>(&self, drawing: &'a PreparedDrawing) -> Result<Cow<'a, ShapeSet>> {
        match &drawing.shapes {
            Some(shapes) => Ok(Cow::Borrowed(shapes)),
            None => Ok(Cow::Owned(self.decomposer.decompose(&drawing.canvas)?)),
        }
    }
}

/// Index of the best-scoring result; the first one wins ties.
pub fn best_target(results: &[ScoreResult]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, result) in results.iter().enumerate() {
        if best.is_none_or(|b| result.score > results[b].score) {
            best = Some(index);
        }
    }
    best
}

/// Rounded mean of the final scores.
pub fn mean_score(results: &[ScoreResult]) -> Option<u8> {
    if results.is_empty() {
        return None;
    }
    let sum: f64 = results.iter().map(|r| r.score as f64).sum();
    Some(round_score(sum / results.len() as f64))
}
