use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sketch::{best_target, mean_score, CombinePolicy, ScoreDetails, ScoreResult, ScoringConfig, SketchError};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SketchKitError {
    #[error(transparent)]
    Sketch(#[from] SketchError),
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("At least one --target image is required")]
    MissingTarget,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
    #[error("Unknown policy '{0}'. Use hybrid, threshold_penalty or feature_blend")]
    UnknownPolicy(String),
}

/// Score of the user drawing against one target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TargetReport {
    pub index: usize,
    pub name: String,
    pub score: u8,
    pub details: ScoreDetails,
}

/// Report for one user drawing compared with every supplied target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MultiTargetReport {
    pub results: Vec<TargetReport>,
    pub best_index: Option<usize>,
    pub best_score: Option<u8>,
    pub mean_score: Option<u8>,
}

impl MultiTargetReport {
    /// Pair each result with its target name; results must follow target order.
    pub fn from_results(names: &[String], results: Vec<ScoreResult>) -> Self {
        let best_index = best_target(&results);
        let mean_score = mean_score(&results);
        let results: Vec<TargetReport> = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| TargetReport {
                index,
                name: names.get(index).cloned().unwrap_or_else(|| format!("target_{index}")),
                score: result.score,
                details: result.details,
            })
            .collect();
        let best_score = best_index.map(|i| results[i].score);

        Self {
            results,
            best_index,
            best_score,
            mean_score,
        }
    }

    pub fn best(&self) -> Option<&TargetReport> {
        self.best_index.and_then(|i| self.results.get(i))
    }

    /// Convert the report to a JSON string
    pub fn to_json(&self) -> Result<String, SketchKitError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Save the report to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SketchKitError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Load a scoring configuration, or the defaults when no path is given
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<ScoringConfig, SketchKitError> {
    match path {
        Some(path) => Ok(ScoringConfig::from_file(path)?),
        None => Ok(ScoringConfig::default()),
    }
}

/// Write a configuration as TOML or JSON, chosen by file extension
pub fn save_config<P: AsRef<Path>>(config: &ScoringConfig, path: P) -> Result<(), SketchKitError> {
    let path_ref = path.as_ref();
    let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::to_string_pretty(config)?,
        Some("json") => config.to_json()?,
        _ => return Err(SketchKitError::UnsupportedFileFormat),
    };
    fs::write(path_ref, content)?;
    Ok(())
}

/// Switch the policy by name. The configured parameters survive when the
/// configuration already uses that policy; otherwise its defaults apply.
pub fn select_policy(config: &mut ScoringConfig, name: &str) -> Result<(), SketchKitError> {
    if config.policy.name() == name {
        return Ok(());
    }
    config.policy = match name {
        "hybrid" => CombinePolicy::default(),
        "threshold_penalty" => CombinePolicy::threshold_penalty(),
        "feature_blend" => CombinePolicy::feature_blend(),
        other => return Err(SketchKitError::UnknownPolicy(other.to_string())),
    };
    Ok(())
}

/// Display name of an input image: its file stem, or the full path
pub fn target_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketch::{BoundaryReport, GateKind};

    fn result(score: u8) -> ScoreResult {
        ScoreResult {
            score,
            details: ScoreDetails {
                policy: "hybrid".to_string(),
                boundary: BoundaryReport {
                    score: score as f64,
                    d_ab: 1.0,
                    d_ba: 1.0,
                    avg_d: 1.0,
                    best_scale: 1.01,
                    iou: 0.5,
                    degenerate: false,
                    samples: Vec::new(),
                },
                geometry: None,
                texture: None,
                feature: None,
                combined: score as f64,
                gates: vec![GateKind::Iou],
            },
        }
    }

    #[test]
    fn report_picks_first_best_and_rounds_mean() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let report = MultiTargetReport::from_results(&names, vec![result(40), result(71), result(71)]);

        assert_eq!(report.best_index, Some(1));
        assert_eq!(report.best_score, Some(71));
        assert_eq!(report.mean_score, Some(61));
        assert_eq!(report.best().map(|r| r.name.as_str()), Some("b"));
        assert_eq!(report.results[2].index, 2);
    }

    #[test]
    fn empty_report_has_no_best() {
        let report = MultiTargetReport::from_results(&[], Vec::new());
        assert!(report.best().is_none());
        assert_eq!(report.mean_score, None);
    }

    #[test]
    fn report_serializes_gate_names() {
        let report = MultiTargetReport::from_results(&["t".to_string()], vec![result(10)]);
        let json = report.to_json().expect("Should serialize");
        assert!(json.contains("\"iou\""));
        assert!(json.contains("\"best_index\": 0"));
    }

    #[test]
    fn default_config_when_no_path() {
        let config = load_config(None::<&Path>).expect("Should load defaults");
        assert_eq!(config, ScoringConfig::default());
    }

    #[test]
    fn saving_with_unknown_extension_fails() {
        let err = save_config(&ScoringConfig::default(), "config.yaml").unwrap_err();
        assert!(matches!(err, SketchKitError::UnsupportedFileFormat));
    }

    #[test]
    fn selecting_the_configured_policy_keeps_its_parameters() {
        let mut config = ScoringConfig::default();
        config.policy = CombinePolicy::ThresholdPenalty {
            min: 20.0,
            low_factor: 0.3,
            feature: sketch::FeatureKind::Loop,
        };
        let configured = config.policy.clone();

        select_policy(&mut config, "threshold_penalty").expect("Should select");
        assert_eq!(config.policy, configured);

        select_policy(&mut config, "feature_blend").expect("Should select");
        assert_eq!(config.policy, CombinePolicy::feature_blend());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let mut config = ScoringConfig::default();
        let err = select_policy(&mut config, "median").unwrap_err();
        assert!(matches!(err, SketchKitError::UnknownPolicy(name) if name == "median"));
        assert_eq!(config.policy, CombinePolicy::default());
    }

    #[test]
    fn name_is_file_stem() {
        assert_eq!(target_name(Path::new("/tmp/targets/house.png")), "house");
    }
}
