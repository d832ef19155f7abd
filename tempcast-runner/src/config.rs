//! Serializable pipeline configuration.
//!
//! One `PipelineConfig` value carries every stage's settings and is passed
//! explicitly to the orchestrator. Every section has serde defaults, so an
//! empty TOML document is a valid configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tempcast_core::data::{Location, TimeWindow};
use tempcast_core::quality::QualityConfig;
use tempcast_core::FeatureConfig;

use crate::models::{GradientBoostingParams, ModelSpec, RandomForestParams, RidgeParams};
use crate::trainer::{Candidate, TrainingMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration, one section per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub quality: QualityConfig,
    pub features: FeatureConfig,
    pub training: TrainingConfig,
    pub tracking: TrackingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub location: Location,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub mode: TrainingMode,
    /// Trained alone in single mode.
    pub default_candidate: Candidate,
    /// Trained and ranked in multiple mode.
    pub candidates: Vec<Candidate>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            mode: TrainingMode::Single,
            default_candidate: Candidate::new("rf_default", ModelSpec::RandomForest(RandomForestParams::default())),
            candidates: default_candidates(),
        }
    }
}

impl TrainingConfig {
    /// Candidates for the configured mode.
    pub fn candidates_for(&self, mode: TrainingMode) -> Vec<Candidate> {
        match mode {
            TrainingMode::Single => vec![self.default_candidate.clone()],
            TrainingMode::Multiple => self.candidates.clone(),
        }
    }
}

/// The comparison set: three forests of growing size, one boosted model,
/// one ridge baseline.
pub fn default_candidates() -> Vec<Candidate> {
    let forest = |n_estimators, max_depth| {
        ModelSpec::RandomForest(RandomForestParams {
            n_estimators,
            max_depth: Some(max_depth),
            ..Default::default()
        })
    };
    vec![
        Candidate::new("rf_50_trees_depth5", forest(50, 5)),
        Candidate::new("rf_100_trees_depth10", forest(100, 10)),
        Candidate::new("rf_200_trees_depth15", forest(200, 15)),
        Candidate::new(
            "gb_lr0.1_depth5",
            ModelSpec::GradientBoosting(GradientBoostingParams::default()),
        ),
        Candidate::new("ridge_alpha1.0", ModelSpec::Ridge(RidgeParams { alpha: 1.0 })),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Root directory of the file-backed experiment store.
    pub root: PathBuf,
    pub experiment: String,
    /// Record a profiling run with dataset statistics before training.
    pub profile_run: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mlruns"),
            experiment: "lahore_temperature_prediction".to_string(),
            profile_run: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where feature tables, models and run reports are written.
    pub dir: PathBuf,
    /// File-name prefix of the persisted feature table.
    pub prefix: String,
    pub persist_features: bool,
    pub persist_models: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/processed"),
            prefix: "weather_processed".to_string(),
            persist_features: true,
            persist_models: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.quality
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("quality: {e}")))?;
        self.features
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("features: {e}")))?;

        if self.training.candidates.is_empty() {
            return Err(ConfigError::Invalid("training.candidates is empty".into()));
        }
        let mut seen = HashSet::new();
        for c in &self.training.candidates {
            if c.name.trim().is_empty() {
                return Err(ConfigError::Invalid("candidate with an empty name".into()));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate candidate name '{}'", c.name)));
            }
        }
        if self.tracking.experiment.trim().is_empty() {
            return Err(ConfigError::Invalid("tracking.experiment is empty".into()));
        }
        if self.output.prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("output.prefix is empty".into()));
        }
        Ok(())
    }
}
