//! Pipeline orchestrator.
//!
//! Drives one bounded batch through
//!
//! ```text
//! STARTED → NORMALIZED → GATE_PASSED | GATE_FAILED
//!         → FEATURES_BUILT → PARTITIONED → TRAINED | TRAIN_FAILED → RECORDED
//! ```
//!
//! The quality gate is the single fail-fast point for data problems: on a
//! failed verdict the feature engine never runs. Artifact persistence and
//! experiment recording are best-effort; their failures become warnings in
//! the report.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tempcast_core::data::{
    normalize, ArtifactManifest, ArtifactSink, FetchError, ModelArtifact, NormalizeError, ObservationSource,
};
use tempcast_core::domain::RawBatch;
use tempcast_core::features::DatasetProfile;
use tempcast_core::fingerprint::DataFingerprint;
use tempcast_core::quality::evaluate;
use tempcast_core::{
    partition, FeatureEngine, FeatureError, FeatureSet, Partition, PartitionError, QualityReport,
};

use crate::config::{ConfigError, PipelineConfig};
use crate::recorder::{
    record_with_retry, ExperimentRecorder, RecordError, RunArtifact, RunKind, RunRecordRequest,
};
use crate::trainer::{TrainError, Trainer, TrainingOutcome};

// ── State machine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Started,
    Normalized,
    GatePassed,
    GateFailed,
    FeaturesBuilt,
    Partitioned,
    Trained,
    TrainFailed,
    Recorded,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStage::GateFailed | PipelineStage::TrainFailed | PipelineStage::Recorded
        )
    }

    /// Legal successor stages. A persisted feature table enters the machine
    /// directly at `FeaturesBuilt`.
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Started, Normalized)
                | (Started, FeaturesBuilt)
                | (Normalized, GatePassed)
                | (Normalized, GateFailed)
                | (GatePassed, FeaturesBuilt)
                | (FeaturesBuilt, Partitioned)
                | (Partitioned, Trained)
                | (Partitioned, TrainFailed)
                | (Trained, Recorded)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: PipelineStage,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StageTracker {
    history: Vec<StageTransition>,
}

impl StageTracker {
    fn start() -> Self {
        let mut t = Self::default();
        t.push(PipelineStage::Started);
        t
    }

    fn push(&mut self, stage: PipelineStage) {
        info!(stage = ?stage, "pipeline stage");
        self.history.push(StageTransition { stage, at: Utc::now() });
    }

    fn advance(&mut self, next: PipelineStage) {
        if let Some(current) = self.history.last().map(|t| t.stage) {
            debug_assert!(current.can_advance_to(next), "illegal transition {current:?} -> {next:?}");
        }
        self.push(next);
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("quality gate failed: {}", .0.violated_rules().join(", "))]
    GateFailed(Box<QualityReport>),

    #[error("feature derivation failed: {0}")]
    Feature(#[from] FeatureError),

    #[error("partitioning failed: {0}")]
    Partition(#[from] PartitionError),

    #[error("training failed: {0}")]
    Train(#[from] TrainError),
}

impl PipelineError {
    /// Process exit code: 2 for a failed gate, 3 when training could not
    /// happen or produced nothing, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::GateFailed(_) => 2,
            PipelineError::Feature(_) | PipelineError::Partition(_) | PipelineError::Train(_) => 3,
            PipelineError::Config(_) | PipelineError::Fetch(_) | PipelineError::Normalize(_) => 1,
        }
    }

    /// Stage the run stopped in.
    pub fn terminal_stage(&self) -> PipelineStage {
        match self {
            PipelineError::Config(_) | PipelineError::Fetch(_) => PipelineStage::Started,
            PipelineError::Normalize(_) => PipelineStage::Started,
            PipelineError::GateFailed(_) => PipelineStage::GateFailed,
            PipelineError::Feature(_) | PipelineError::Partition(_) | PipelineError::Train(_) => {
                PipelineStage::TrainFailed
            }
        }
    }

    pub fn quality_report(&self) -> Option<&QualityReport> {
        match self {
            PipelineError::GateFailed(report) => Some(&**report),
            _ => None,
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_fraction: f64,
    pub last_train_timestamp: Option<NaiveDateTime>,
    pub first_test_timestamp: Option<NaiveDateTime>,
}

impl From<&Partition> for PartitionSummary {
    fn from(p: &Partition) -> Self {
        Self {
            train_rows: p.train.len(),
            test_rows: p.test.len(),
            test_fraction: p.test_fraction,
            last_train_timestamp: p.last_train_timestamp(),
            first_test_timestamp: p.first_test_timestamp(),
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub experiment: String,
    pub config_hash: String,
    pub stages: Vec<StageTransition>,
    /// `None` when training from a persisted feature table.
    pub quality: Option<QualityReport>,
    pub fingerprint: Option<DataFingerprint>,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub partition: PartitionSummary,
    pub training: TrainingOutcome,
    pub feature_artifacts: Option<ArtifactManifest>,
    pub model_artifacts: Vec<ModelArtifact>,
    pub profile_run_id: Option<String>,
    /// Best-effort failures (persistence, recording) that did not stop the run.
    pub warnings: Vec<String>,
}

impl PipelineReport {
    pub fn final_stage(&self) -> Option<PipelineStage> {
        self.stages.last().map(|t| t.stage)
    }
}

// ── Orchestration ────────────────────────────────────────────────────

/// Optional collaborators. Absent services are skipped.
#[derive(Clone, Copy, Default)]
pub struct PipelineServices<'a> {
    pub recorder: Option<&'a dyn ExperimentRecorder>,
    pub sink: Option<&'a dyn ArtifactSink>,
}

/// Fetch a batch from `source`, then run it.
pub fn fetch_and_run(
    source: &dyn ObservationSource,
    config: &PipelineConfig,
    services: PipelineServices<'_>,
) -> Result<PipelineReport, PipelineError> {
    let raw = source.fetch_batch(&config.source.location, &config.source.window)?;
    info!(source = source.name(), entries = raw.len(), "raw batch fetched");
    run_pipeline(&raw, config, services)
}

/// Run the full pipeline on one raw batch.
pub fn run_pipeline(
    raw: &RawBatch,
    config: &PipelineConfig,
    services: PipelineServices<'_>,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let config_hash = config.config_hash()?;
    let mut tracker = StageTracker::start();

    let batch = normalize(raw)?;
    tracker.advance(PipelineStage::Normalized);

    let engine = FeatureEngine::new(config.features.clone())?;
    let gate = config.quality.clone().with_default_min_rows(engine.min_history());
    let quality = evaluate(&batch, &gate);
    if !quality.passed {
        tracker.advance(PipelineStage::GateFailed);
        warn!(rules = ?quality.violated_rules(), "quality gate failed");
        return Err(PipelineError::GateFailed(Box::new(quality)));
    }
    tracker.advance(PipelineStage::GatePassed);

    let set = engine.build(&batch)?;
    tracker.advance(PipelineStage::FeaturesBuilt);

    let mut warnings = Vec::new();
    let fingerprint = match DataFingerprint::new(&batch, &set) {
        Ok(f) => Some(f),
        Err(e) => {
            warnings.push(format!("fingerprint: {e}"));
            None
        }
    };

    train_feature_set(
        &set,
        config,
        services,
        TrainInputs {
            config_hash,
            tracker,
            quality: Some(quality),
            fingerprint,
            warnings,
        },
    )
}

/// Train from an already-built (e.g. persisted) feature set.
pub fn run_from_features(
    set: &FeatureSet,
    config: &PipelineConfig,
    services: PipelineServices<'_>,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let config_hash = config.config_hash()?;
    let mut tracker = StageTracker::start();
    tracker.advance(PipelineStage::FeaturesBuilt);

    train_feature_set(
        set,
        config,
        services,
        TrainInputs {
            config_hash,
            tracker,
            quality: None,
            fingerprint: None,
            warnings: Vec::new(),
        },
    )
}

struct TrainInputs {
    config_hash: String,
    tracker: StageTracker,
    quality: Option<QualityReport>,
    fingerprint: Option<DataFingerprint>,
    warnings: Vec<String>,
}

fn train_feature_set(
    set: &FeatureSet,
    config: &PipelineConfig,
    services: PipelineServices<'_>,
    inputs: TrainInputs,
) -> Result<PipelineReport, PipelineError> {
    let TrainInputs {
        config_hash,
        mut tracker,
        quality,
        fingerprint,
        mut warnings,
    } = inputs;

    let profile = DatasetProfile::from_feature_set(set);

    let feature_artifacts = match services.sink {
        Some(sink) if config.output.persist_features => match sink.persist_features(set, Some(&profile)) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(error = %e, "feature table not persisted");
                warnings.push(format!("feature table: {e}"));
                None
            }
        },
        _ => None,
    };

    let profile_run_id = match services.recorder {
        Some(recorder) if config.tracking.profile_run => {
            match record_profile(recorder, config, set, &profile, fingerprint.as_ref()) {
                Ok(id) => Some(id),
                Err(e) => {
                    warnings.push(format!("profiling run: {e}"));
                    None
                }
            }
        }
        _ => None,
    };

    let split = match partition(set, config.features.test_fraction) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "partitioning failed");
            return Err(e.into());
        }
    };
    tracker.advance(PipelineStage::Partitioned);

    let mut trainer = Trainer::new(config.tracking.experiment.clone()).with_tag("config_hash", config_hash.clone());
    if let Some(recorder) = services.recorder {
        trainer = trainer.with_recorder(recorder);
    }
    if let Some(fp) = &fingerprint {
        trainer = trainer
            .with_dataset(fp.dataset_hash.clone())
            .with_tag("feature_checksum", fp.feature_checksum.0.clone());
    }

    let candidates = config.training.candidates_for(config.training.mode);
    let training = match trainer.train(&split, &candidates) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracker.advance(PipelineStage::TrainFailed);
            return Err(e.into());
        }
    };
    tracker.advance(PipelineStage::Trained);

    let mut model_artifacts = Vec::new();
    if let Some(sink) = services.sink.filter(|_| config.output.persist_models) {
        for run in &training.runs {
            let persisted = serde_json::to_vec_pretty(&run.model)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    sink.persist_model(&run.name, &bytes, &run.feature_names)
                        .map_err(|e| e.to_string())
                });
            match persisted {
                Ok(artifact) => model_artifacts.push(artifact),
                Err(e) => {
                    warn!(run = %run.name, error = %e, "model not persisted");
                    warnings.push(format!("model {}: {e}", run.name));
                }
            }
        }
    }

    warnings.extend(training.recording_warnings.iter().cloned());
    tracker.advance(PipelineStage::Recorded);

    Ok(PipelineReport {
        experiment: config.tracking.experiment.clone(),
        config_hash,
        stages: tracker.history,
        quality,
        fingerprint,
        feature_names: set.feature_names.clone(),
        target_name: set.target_name.clone(),
        partition: PartitionSummary::from(&split),
        training,
        feature_artifacts,
        model_artifacts,
        profile_run_id,
        warnings,
    })
}

/// Best-effort profiling run: dataset shape and target statistics.
fn record_profile(
    recorder: &dyn ExperimentRecorder,
    config: &PipelineConfig,
    set: &FeatureSet,
    profile: &DatasetProfile,
    fingerprint: Option<&DataFingerprint>,
) -> Result<String, RecordError> {
    let now = Utc::now();
    let mut params = BTreeMap::new();
    params.insert("data_rows".to_string(), serde_json::json!(profile.rows));
    params.insert("data_columns".to_string(), serde_json::json!(profile.columns));

    let mut metrics = BTreeMap::new();
    if let Some(target) = profile.column(&set.target_name) {
        metrics.insert("target_mean".to_string(), target.mean);
        metrics.insert("target_std".to_string(), target.std);
        metrics.insert("target_min".to_string(), target.min);
        metrics.insert("target_max".to_string(), target.max);
    }
    if let Some(temp) = profile.column(&config.features.target_field) {
        metrics.insert("current_temp_mean".to_string(), temp.mean);
        metrics.insert("current_temp_std".to_string(), temp.std);
    }

    let request = RunRecordRequest {
        experiment: config.tracking.experiment.clone(),
        run_name: "data_profiling".to_string(),
        kind: RunKind::Profiling,
        dataset_hash: fingerprint.map(|f| f.dataset_hash.clone()),
        started_at: now,
        finished_at: now,
        params,
        metrics,
        tags: Default::default(),
        artifacts: vec![RunArtifact::json("dataset_summary.json", profile)?],
    };
    record_with_retry(recorder, &request)
}
