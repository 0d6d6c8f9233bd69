use std::sync::Arc;

use crate::{
    config::{CombinePolicy, ContourRetrieval, ExtractMode, ScoringConfig},
    error::Result,
    pipeline::Scorer,
    traits::ScoreCombiner,
};

/// Builder for creating scorers with a fluent API
#[derive(Default)]
pub struct ScorerBuilder {
    config: ScoringConfig,
    combiner: Option<Arc<dyn ScoreCombiner>>,
}

impl ScorerBuilder {
    /// Create a new builder holding the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (replaces everything set so far)
    pub fn config(mut self, config: ScoringConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(mut self, mode: ExtractMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn side(mut self, side: u32) -> Self {
        self.config.side = side;
        self
    }

    pub fn tau(mut self, tau: f64) -> Self {
        self.config.tau = tau;
        self
    }

    /// Scale range of the registration scan
    pub fn scan(mut self, from: f64, to: f64, steps: usize) -> Self {
        self.config.scan_from = from;
        self.config.scan_to = to;
        self.config.scan_n = steps;
        self
    }

    pub fn retrieval(mut self, retrieval: ContourRetrieval) -> Self {
        self.config.shapes.retrieval = retrieval;
        self
    }

    pub fn with_texture(mut self, enabled: bool) -> Self {
        self.config.texture.enabled = enabled;
        self
    }

    pub fn policy(mut self, policy: CombinePolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Use a custom combination strategy instead of the configured policy
    pub fn with_combiner<C>(mut self, combiner: C) -> Self
    where
        C: ScoreCombiner + 'static,
    {
        self.combiner = Some(Arc::new(combiner));
        self
    }

    /// Validate the configuration and build the scorer
    pub fn build(self) -> Result<Scorer> {
        match self.combiner {
            Some(combiner) => Scorer::with_combiner(self.config, combiner),
            None => Scorer::new(self.config),
        }
    }
}
