//! # Sketch Similarity Scoring Library
//!
//! Scores how closely a freehand drawing matches one or more reference
//! drawings on a 0-100 scale. Both drawings are cropped to their strokes and
//! normalized onto a square canvas, then compared along several axes:
//!
//! - **Boundary**: bidirectional capped chamfer distance over a scan of scales
//! - **Geometry**: decomposition into primitive shapes and greedy relational matching
//! - **Texture** (optional): oriented-gradient bag-of-visual-words with chi-squared distance
//! - **Intersection**: whether a closed loop sits at the target figure's waist, or
//!   how well the band where the figure's halves cross matches the target's
//!
//! The sub-scores are merged by a pluggable [`ScoreCombiner`] chosen in the
//! configuration; the default hybrid policy applies ceiling gates afterwards.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sketch::{RasterImage, Scorer};
//!
//! let scorer = Scorer::builder().build()?;
//! let user = RasterImage::open("user.png")?;
//! let target = RasterImage::open("target.png")?;
//!
//! let result = scorer.score(&user, &target)?;
//! println!("{} ({:?})", result.score, result.details.gates);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Policy
//!
//! ```rust,no_run
//! use sketch::{CombinePolicy, ExtractMode, Scorer};
//!
//! let scorer = Scorer::builder()
//!     .mode(ExtractMode::Edge)
//!     .side(512)
//!     .scan(0.85, 1.20, 8)
//!     .policy(CombinePolicy::feature_blend())
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod config;
pub mod types;
pub mod report;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod io;

// Re-exports for convenience
pub use error::{Result, SketchError};
pub use config::{
    CombinePolicy, ContourRetrieval, CrossingConfig, ExtractMode, FeatureConfig, FeatureKind, GateConfig,
    HybridPolicy, MatchConfig, ScoringConfig, ShapeConfig, TextureConfig, TextureMapping,
};
pub use types::{
    BinaryMap, Orientation, OverlapMatrix, PixelBox, RasterImage, ShapeDescriptor, ShapeKind, ShapeSet,
};
pub use report::{
    BoundaryReport, FeatureReport, GateKind, GeometryAxes, GeometryReport, MatchedPair, ReportMetric,
    ScaleSample, ScoreDetails, ScoreResult, TextureReport,
};
pub use traits::*;
pub use algorithms::*;
pub use pipeline::{
    best_target, builder::ScorerBuilder, combine::{build_combiner, FeatureBlendCombiner, HybridCombiner, ThresholdPenaltyCombiner},
    mean_score, PreparedDrawing, Scorer,
};
pub use io::load_rasters;
