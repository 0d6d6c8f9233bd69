//! Scoring configuration.
//!
//! Every knob of the engine lives in [`ScoringConfig`]. The flat top-level
//! fields mirror the options the drawing server has always accepted
//! (`mode`, `side`, `tau`, `scan_from`, ...); the nested groups hold the
//! shape, matching, texture, intersection-feature and combination settings.
//! A config is validated once, before any image is touched.

use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use crate::algorithms::faces::MAX_FACES;
use crate::error::{Result, SketchError};

/// How a raster is turned into a stroke map.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Gradient edges with thresholds derived from the median intensity
    #[serde(alias = "edges")]
    #[strum(to_string = "edge", serialize = "edges")]
    Edge,
    /// Otsu binarization of the inverted intensity, dark strokes as foreground
    #[default]
    #[strum(to_string = "binary")]
    Binary,
}

/// Which outer borders the shape decomposer keeps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContourRetrieval {
    /// Top-level outer borders only
    #[default]
    External,
    /// Every outer border, including figures nested inside another figure's hole
    AllOuter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoringConfig {
    pub mode: ExtractMode,
    /// Side length of the square normalization canvas
    pub side: u32,
    /// Reference length of the longer content side, capped by `side`
    pub ref_long: u32,
    /// Margin added around the content bounding box before cropping
    pub margin: u32,
    /// Boundary distance cap in pixels
    pub tau: f64,
    pub scan_from: f64,
    pub scan_to: f64,
    pub scan_n: usize,
    pub shapes: ShapeConfig,
    pub matching: MatchConfig,
    pub texture: TextureConfig,
    pub feature: FeatureConfig,
    pub policy: CombinePolicy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ExtractMode::Binary,
            side: 128,
            ref_long: 360,
            margin: 6,
            tau: 8.0,
            scan_from: 0.85,
            scan_to: 1.25,
            scan_n: 11,
            shapes: ShapeConfig::default(),
            matching: MatchConfig::default(),
            texture: TextureConfig::default(),
            feature: FeatureConfig::default(),
            policy: CombinePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ShapeConfig {
    /// Contours smaller than this fraction of the canvas area are noise
    pub area_min_ratio: f64,
    /// Polygon approximation tolerance as a fraction of the perimeter
    pub approx_epsilon: f64,
    /// Allowed deviation of the min-area rectangle side ratio from 1 for squares
    pub square_tolerance: f64,
    /// Circularity (4πA/P²) above which a shape is reclassified as a circle
    pub circularity_min: f64,
    /// Fewest approximation vertices a shape needs before it can become a circle
    pub circle_min_vertices: usize,
    pub blur_sigma: f32,
    /// Morphological kernel sizes (odd, in pixels)
    pub open: u32,
    pub close: u32,
    pub dilate: u32,
    pub retrieval: ContourRetrieval,
    /// Area over convex-hull area above which a union of enclosed faces is one figure
    pub solidity_min: f64,
    /// Components enclosing more faces than this are kept whole
    pub max_faces: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            area_min_ratio: 0.005,
            approx_epsilon: 0.03,
            square_tolerance: 0.15,
            circularity_min: 0.8,
            circle_min_vertices: 5,
            blur_sigma: 0.8,
            open: 3,
            close: 3,
            dilate: 3,
            retrieval: ContourRetrieval::External,
            solidity_min: 0.94,
            max_faces: 6,
        }
    }
}

/// Cost weights of the relational matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MatchConfig {
    pub type_weight: f64,
    pub orientation_weight: f64,
    pub area_weight: f64,
    pub aspect_weight: f64,
    pub vertex_weight: f64,
    /// Cost per unit of shape-count difference
    pub count_penalty: f64,
    pub layout_weight: f64,
    pub overlap_weight: f64,
    pub overlap_flag_weight: f64,
    /// Fixed cost when the target overlaps strongly and the user never does
    pub missed_overlap_penalty: f64,
    /// Ratio above which two shapes count as overlapping
    pub overlap_threshold: f64,
    /// User-side maximum overlap below which a target overlap counts as missed
    pub user_overlap_floor: f64,
    /// Points subtracted from 100 per unit of total cost
    pub k: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            type_weight: 1.0,
            orientation_weight: 0.5,
            area_weight: 0.5,
            aspect_weight: 0.3,
            vertex_weight: 0.2,
            count_penalty: 1.0,
            layout_weight: 1.0,
            overlap_weight: 0.5,
            overlap_flag_weight: 0.5,
            missed_overlap_penalty: 1.0,
            overlap_threshold: 0.25,
            user_overlap_floor: 0.15,
            k: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TextureConfig {
    pub enabled: bool,
    /// Cell side in pixels for the oriented-gradient histograms
    pub cell: u32,
    /// Number of visual words clustered per comparison
    pub vocabulary: usize,
    pub iterations: usize,
    pub mapping: TextureMapping,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cell: 8,
            vocabulary: 16,
            iterations: 10,
            mapping: TextureMapping::default(),
        }
    }
}

/// Monotone map from chi-squared distance to a 0-100 score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextureMapping {
    Linear,
    Logistic { midpoint: f64, steepness: f64 },
}

impl Default for TextureMapping {
    fn default() -> Self {
        Self::Linear
    }
}

/// Which intersection sub-feature a feature policy consults.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// A closed loop of the user drawing near the target's waist
    #[default]
    Loop,
    /// Shape of the band where the upper and lower halves of the figure meet
    Crossing,
}

impl FeatureKind {
    fn crossing() -> Self {
        Self::Crossing
    }
}

/// Parameters of the intersection sub-features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FeatureConfig {
    pub hole_dilate: u32,
    pub hole_close: u32,
    /// Height of the waist band as a fraction of the canvas height
    pub waist_band_frac: f64,
    pub hole_area_min_frac: f64,
    pub hole_area_max_frac: f64,
    /// Min-rect short/long ratio below which a hole is considered flat
    pub flat_min: f64,
    /// Tolerance in degrees for opposite angles summing to 180
    pub angle_tol: f64,
    pub center_weight: f64,
    pub shape_weight: f64,
    pub quad_bonus: f64,
    /// Kernel sizes used to fill target strokes when locating the waist
    pub fill_close: u32,
    pub fill_dilate: u32,
    pub crossing: CrossingConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            hole_dilate: 3,
            hole_close: 3,
            waist_band_frac: 0.20,
            hole_area_min_frac: 0.0015,
            hole_area_max_frac: 0.06,
            flat_min: 0.16,
            angle_tol: 25.0,
            center_weight: 0.40,
            shape_weight: 0.60,
            quad_bonus: 0.10,
            fill_close: 7,
            fill_dilate: 7,
            crossing: CrossingConfig::default(),
        }
    }
}

/// Parameters of the crossing sub-feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CrossingConfig {
    /// Rows on each side of the waist shared by the upper and lower halves
    pub margin: u32,
    /// Shared area over the smaller half below which there is no crossing
    pub area_min_ratio: f64,
    /// Hu distance at which the crossing score reaches zero
    pub hu_tau: f64,
    pub quad_bonus: f64,
    /// Polygon approximation tolerance as a fraction of the perimeter
    pub approx_epsilon: f64,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            margin: 4,
            area_min_ratio: 0.05,
            hu_tau: 0.35,
            quad_bonus: 0.15,
            approx_epsilon: 0.02,
        }
    }
}

/// Strategy that turns sub-scores into the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombinePolicy {
    /// Weighted blend of boundary, geometric and texture scores, then ceiling gates
    Hybrid(HybridPolicy),
    /// Boundary score scaled by `low_factor` when the intersection feature scores below `min`
    ThresholdPenalty {
        min: f64,
        low_factor: f64,
        #[serde(default = "FeatureKind::crossing")]
        feature: FeatureKind,
    },
    /// Blend boundary with the intersection feature when it exists, penalize otherwise
    FeatureBlend {
        boundary_weight: f64,
        exist_threshold: f64,
        no_feature_factor: f64,
        #[serde(default)]
        feature: FeatureKind,
    },
}

impl Default for CombinePolicy {
    fn default() -> Self {
        Self::Hybrid(HybridPolicy::default())
    }
}

impl CombinePolicy {
    pub fn threshold_penalty() -> Self {
        Self::ThresholdPenalty {
            min: 30.0,
            low_factor: 0.6,
            feature: FeatureKind::Crossing,
        }
    }

    pub fn feature_blend() -> Self {
        Self::FeatureBlend {
            boundary_weight: 0.6,
            exist_threshold: 15.0,
            no_feature_factor: 0.55,
            feature: FeatureKind::Loop,
        }
    }

    /// Intersection sub-feature the policy consults, if any.
    pub fn feature(&self) -> Option<FeatureKind> {
        match self {
            Self::Hybrid(_) => None,
            Self::ThresholdPenalty { feature, .. } | Self::FeatureBlend { feature, .. } => Some(*feature),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hybrid(_) => "hybrid",
            Self::ThresholdPenalty { .. } => "threshold_penalty",
            Self::FeatureBlend { .. } => "feature_blend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HybridPolicy {
    pub boundary_weight: f64,
    pub geometric_weight: f64,
    /// Only used when texture scoring is enabled
    pub texture_weight: f64,
    pub gates: GateConfig,
}

impl Default for HybridPolicy {
    fn default() -> Self {
        Self {
            boundary_weight: 0.5,
            geometric_weight: 0.5,
            texture_weight: 0.2,
            gates: GateConfig::default(),
        }
    }
}

/// Ceiling rules of the hybrid policy. Each may only lower the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GateConfig {
    pub count_ratio_min: f64,
    pub count_cap: f64,
    pub type_ratio_min: f64,
    pub type_cap: f64,
    pub overlap_target_min: f64,
    pub overlap_user_max: f64,
    pub overlap_cap: f64,
    pub iou_min: f64,
    pub iou_cap: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            count_ratio_min: 0.6,
            count_cap: 55.0,
            type_ratio_min: 0.5,
            type_cap: 60.0,
            overlap_target_min: 0.25,
            overlap_user_max: 0.15,
            overlap_cap: 65.0,
            iou_min: 0.08,
            iou_cap: 45.0,
        }
    }
}

impl ScoringConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ScoringConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: ScoringConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path_ref),
            Some("json") => Self::from_json_file(path_ref),
            other => Err(SketchError::config(format!(
                "unsupported config format {:?}, use .toml or .json",
                other.unwrap_or("")
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON schema of the configuration document
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ScoringConfig)
    }

    /// Scale factors visited by the registration scan, evenly spaced and inclusive.
    pub fn scales(&self) -> Vec<f64> {
        linspace(self.scan_from, self.scan_to, self.scan_n)
    }

    /// Reject every parameter outside its domain.
    pub fn validate(&self) -> Result<()> {
        if self.side == 0 {
            return Err(SketchError::config("side must be positive"));
        }
        if self.ref_long == 0 {
            return Err(SketchError::config("ref_long must be positive"));
        }
        ensure_positive("tau", self.tau)?;
        if self.scan_n < 1 {
            return Err(SketchError::config("scan_n must be at least 1"));
        }
        ensure_positive("scan_from", self.scan_from)?;
        ensure_positive("scan_to", self.scan_to)?;
        if self.margin >= self.ref_long.max(self.side) {
            return Err(SketchError::config(format!(
                "margin must be smaller than the larger of ref_long and side, got {}",
                self.margin
            )));
        }

        let shapes = &self.shapes;
        if !(0.0..1.0).contains(&shapes.area_min_ratio) {
            return Err(SketchError::config("shapes.area_min_ratio must lie in [0, 1)"));
        }
        ensure_positive("shapes.approx_epsilon", shapes.approx_epsilon)?;
        ensure_fraction("shapes.square_tolerance", shapes.square_tolerance)?;
        ensure_fraction("shapes.circularity_min", shapes.circularity_min)?;
        if !shapes.blur_sigma.is_finite() || shapes.blur_sigma < 0.0 {
            return Err(SketchError::config("shapes.blur_sigma must be a non-negative number"));
        }
        ensure_kernel("shapes.open", shapes.open)?;
        ensure_kernel("shapes.close", shapes.close)?;
        ensure_kernel("shapes.dilate", shapes.dilate)?;
        ensure_fraction("shapes.solidity_min", shapes.solidity_min)?;
        if shapes.max_faces > MAX_FACES {
            return Err(SketchError::config(format!(
                "shapes.max_faces must be at most {MAX_FACES}, got {}",
                shapes.max_faces
            )));
        }

        let m = &self.matching;
        for (name, value) in [
            ("matching.type_weight", m.type_weight),
            ("matching.orientation_weight", m.orientation_weight),
            ("matching.area_weight", m.area_weight),
            ("matching.aspect_weight", m.aspect_weight),
            ("matching.vertex_weight", m.vertex_weight),
            ("matching.count_penalty", m.count_penalty),
            ("matching.layout_weight", m.layout_weight),
            ("matching.overlap_weight", m.overlap_weight),
            ("matching.overlap_flag_weight", m.overlap_flag_weight),
            ("matching.missed_overlap_penalty", m.missed_overlap_penalty),
        ] {
            ensure_non_negative(name, value)?;
        }
        ensure_fraction("matching.overlap_threshold", m.overlap_threshold)?;
        ensure_fraction("matching.user_overlap_floor", m.user_overlap_floor)?;
        ensure_positive("matching.k", m.k)?;

        let t = &self.texture;
        if t.cell < 2 {
            return Err(SketchError::config("texture.cell must be at least 2"));
        }
        if t.vocabulary == 0 || t.iterations == 0 {
            return Err(SketchError::config(
                "texture.vocabulary and texture.iterations must be positive",
            ));
        }
        if let TextureMapping::Logistic { midpoint, steepness } = t.mapping {
            ensure_non_negative("texture.mapping.midpoint", midpoint)?;
            ensure_positive("texture.mapping.steepness", steepness)?;
        }

        let f = &self.feature;
        ensure_kernel("feature.hole_dilate", f.hole_dilate)?;
        ensure_kernel("feature.hole_close", f.hole_close)?;
        ensure_kernel("feature.fill_close", f.fill_close)?;
        ensure_kernel("feature.fill_dilate", f.fill_dilate)?;
        ensure_positive("feature.waist_band_frac", f.waist_band_frac)?;
        ensure_fraction("feature.waist_band_frac", f.waist_band_frac)?;
        ensure_positive("feature.hole_area_min_frac", f.hole_area_min_frac)?;
        ensure_fraction("feature.hole_area_max_frac", f.hole_area_max_frac)?;
        if f.hole_area_min_frac > f.hole_area_max_frac {
            return Err(SketchError::config(
                "feature.hole_area_min_frac exceeds feature.hole_area_max_frac",
            ));
        }
        ensure_fraction("feature.flat_min", f.flat_min)?;
        ensure_positive("feature.angle_tol", f.angle_tol)?;
        ensure_non_negative("feature.center_weight", f.center_weight)?;
        ensure_non_negative("feature.shape_weight", f.shape_weight)?;
        ensure_non_negative("feature.quad_bonus", f.quad_bonus)?;
        let x = &f.crossing;
        ensure_fraction("feature.crossing.area_min_ratio", x.area_min_ratio)?;
        ensure_positive("feature.crossing.hu_tau", x.hu_tau)?;
        ensure_non_negative("feature.crossing.quad_bonus", x.quad_bonus)?;
        ensure_positive("feature.crossing.approx_epsilon", x.approx_epsilon)?;

        self.validate_policy()
    }

    fn validate_policy(&self) -> Result<()> {
        match &self.policy {
            CombinePolicy::Hybrid(hybrid) => {
                ensure_non_negative("policy.boundary_weight", hybrid.boundary_weight)?;
                ensure_non_negative("policy.geometric_weight", hybrid.geometric_weight)?;
                ensure_non_negative("policy.texture_weight", hybrid.texture_weight)?;
                let mut active = hybrid.boundary_weight + hybrid.geometric_weight;
                if self.texture.enabled {
                    active += hybrid.texture_weight;
                }
                if active <= 0.0 {
                    return Err(SketchError::config("policy weights sum to zero"));
                }
                let g = &hybrid.gates;
                for (name, ratio) in [
                    ("policy.gates.count_ratio_min", g.count_ratio_min),
                    ("policy.gates.type_ratio_min", g.type_ratio_min),
                    ("policy.gates.overlap_target_min", g.overlap_target_min),
                    ("policy.gates.overlap_user_max", g.overlap_user_max),
                    ("policy.gates.iou_min", g.iou_min),
                ] {
                    ensure_fraction(name, ratio)?;
                }
                for (name, cap) in [
                    ("policy.gates.count_cap", g.count_cap),
                    ("policy.gates.type_cap", g.type_cap),
                    ("policy.gates.overlap_cap", g.overlap_cap),
                    ("policy.gates.iou_cap", g.iou_cap),
                ] {
                    ensure_score(name, cap)?;
                }
            }
            CombinePolicy::ThresholdPenalty { min, low_factor, .. } => {
                ensure_score("policy.min", *min)?;
                ensure_fraction("policy.low_factor", *low_factor)?;
            }
            CombinePolicy::FeatureBlend {
                boundary_weight,
                exist_threshold,
                no_feature_factor,
                ..
            } => {
                ensure_fraction("policy.boundary_weight", *boundary_weight)?;
                ensure_score("policy.exist_threshold", *exist_threshold)?;
                ensure_fraction("policy.no_feature_factor", *no_feature_factor)?;
            }
        }
        Ok(())
    }
}

/// Morphological radius for an odd kernel size.
pub(crate) fn kernel_radius(size: u32) -> u8 {
    (size / 2).min(u8::MAX as u32) as u8
}

pub(crate) fn linspace(from: f64, to: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![from],
        _ => {
            let step = (to - from) / (n - 1) as f64;
            (0..n).map(|i| from + step * i as f64).collect()
        }
    }
}

fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SketchError::config(format!("{name} must be a positive number, got {value}")))
    }
}

fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SketchError::config(format!("{name} must be a non-negative number, got {value}")))
    }
}

fn ensure_fraction(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SketchError::config(format!("{name} must lie in [0, 1], got {value}")))
    }
}

fn ensure_score(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(SketchError::config(format!("{name} must lie in [0, 100], got {value}")))
    }
}

fn ensure_kernel(name: &str, size: u32) -> Result<()> {
    if size == 0 || size % 2 == 0 || size > 511 {
        Err(SketchError::config(format!("{name} must be an odd kernel size in 1..=511, got {size}")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn default_config_is_valid() {
        ScoringConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn rejects_out_of_domain_parameters() {
        let mut config = ScoringConfig::default();
        config.side = 0;
        assert!(matches!(config.validate(), Err(SketchError::Configuration(_))));

        let mut config = ScoringConfig::default();
        config.tau = 0.0;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.scan_n = 0;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.shapes.close = 4;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.policy = CombinePolicy::Hybrid(HybridPolicy {
            boundary_weight: 0.0,
            geometric_weight: 0.0,
            ..HybridPolicy::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn linspace_is_inclusive() {
        let scales = ScoringConfig::default().scales();
        assert_eq!(scales.len(), 11);
        assert!((scales[0] - 0.85).abs() < 1e-12);
        assert!((scales[10] - 1.25).abs() < 1e-12);
        assert!((scales[1] - scales[0] - 0.04).abs() < 1e-12);
        assert_eq!(linspace(0.9, 1.1, 1), vec![0.9]);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = ScoringConfig::from_toml(
            r#"
            mode = "edges"
            side = 256
            tau = 6.0

            [policy]
            kind = "threshold_penalty"
            min = 25.0
            low_factor = 0.5
            "#,
        )
        .expect("Should parse");
        assert_eq!(config.mode, ExtractMode::Edge);
        assert_eq!(config.side, 256);
        assert_eq!(config.scan_n, 11);
        assert_eq!(config.policy.name(), "threshold_penalty");
        assert_eq!(config.policy.feature(), Some(FeatureKind::Crossing));
    }

    #[test]
    fn feature_blend_may_switch_to_the_crossing_feature() {
        let config = ScoringConfig::from_toml(
            r#"
            [policy]
            kind = "feature_blend"
            boundary_weight = 0.65
            exist_threshold = 0.0
            no_feature_factor = 1.0
            feature = "crossing"

            [feature.crossing]
            hu_tau = 0.5
            "#,
        )
        .expect("Should parse");
        assert_eq!(config.policy.feature(), Some(FeatureKind::Crossing));
        assert_eq!(config.feature.crossing.hu_tau, 0.5);
        assert_eq!(config.feature.crossing.area_min_ratio, 0.05);
        assert_eq!(CombinePolicy::default().feature(), None);
        assert_eq!(CombinePolicy::feature_blend().feature(), Some(FeatureKind::Loop));
    }

    #[test]
    fn oversized_margin_is_rejected() {
        let mut config = ScoringConfig::default();
        config.margin = u32::MAX;
        assert!(matches!(config.validate(), Err(SketchError::Configuration(_))));

        config.margin = 359;
        config.validate().expect("margin below ref_long is fine");
    }

    #[test]
    fn face_limits_are_checked() {
        let mut config = ScoringConfig::default();
        config.shapes.max_faces = MAX_FACES + 1;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.shapes.solidity_min = 1.5;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.feature.crossing.hu_tau = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trip_keeps_policy() {
        let mut config = ScoringConfig::default();
        config.policy = CombinePolicy::feature_blend();
        let json = config.to_json().expect("Should serialize");
        let parsed = ScoringConfig::from_json(&json).expect("Should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn mode_parses_from_cli_strings() {
        assert_eq!(ExtractMode::from_str("edges").unwrap(), ExtractMode::Edge);
        assert_eq!(ExtractMode::from_str("binary").unwrap(), ExtractMode::Binary);
        assert_eq!(ExtractMode::Edge.to_string(), "edge");
        assert_eq!(
            ContourRetrieval::from_str("all_outer").unwrap(),
            ContourRetrieval::AllOuter
        );
    }

    #[test]
    fn unknown_extension_is_a_configuration_error() {
        let err = ScoringConfig::from_file("settings.yaml").unwrap_err();
        assert!(matches!(err, SketchError::Configuration(_)));
    }
}
