use image::GrayImage;

use crate::{
    config::FeatureKind,
    error::Result,
    report::{BoundaryReport, FeatureReport, GateKind, GeometryReport, TextureReport},
    types::BinaryMap,
};

/// Trait for turning a drawing into a stroke map
pub trait StrokeExtractor: Send + Sync {
    /// Extract foreground strokes from an intensity image (dark ink on light paper)
    fn extract(&self, image: &GrayImage) -> Result<BinaryMap>;
}

/// Trait for contour extraction algorithms
pub trait ContourExtractor: Send + Sync {
    /// Extract closed boundaries from a binary image
    fn extract_contours(&self, image: &GrayImage) -> Result<Vec<Vec<[f64; 2]>>>;
}

/// Trait for polygon approximation of closed rings
pub trait PolygonApproximator: Send + Sync {
    /// Reduce a closed ring to its corner vertices; the result is not closed
    fn approximate(&self, ring: &[[f64; 2]], epsilon: f64) -> Vec<[f64; 2]>;
}

/// Sub-scores a combination policy asks the pipeline to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    pub geometry: bool,
    pub texture: bool,
    /// Intersection sub-feature to compute, if any
    pub feature: Option<FeatureKind>,
}

/// Everything computed for one user/target pair, handed to the combiner.
#[derive(Debug, Clone, Copy)]
pub struct SubScores<'a> {
    pub boundary: &'a BoundaryReport,
    pub geometry: Option<&'a GeometryReport>,
    pub texture: Option<&'a TextureReport>,
    pub feature: Option<&'a FeatureReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    /// Policy output before any ceiling
    pub combined: f64,
    /// Score after ceilings, in [0, 100]
    pub score: f64,
    pub gates: Vec<GateKind>,
}

/// Strategy that merges sub-scores into the final score
pub trait ScoreCombiner: Send + Sync {
    fn name(&self) -> &'static str;

    fn requirements(&self) -> Requirements;

    fn combine(&self, scores: &SubScores<'_>) -> Combination;
}
