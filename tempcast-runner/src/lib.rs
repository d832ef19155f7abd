//! Tempcast Runner: training orchestration and experiment tracking.
//!
//! This crate builds on `tempcast-core` to provide:
//! - Pipeline configuration (TOML, serde defaults, config hash)
//! - Regressors behind a uniform fit/predict trait
//! - Regression metrics and run ranking
//! - The trainer (parallel candidate fits, sequential recording)
//! - The experiment recorder trait and a JSONL file recorder
//! - The pipeline orchestrator and its stage machine
//! - JSON + Markdown run reports

pub mod config;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod ranking;
pub mod recorder;
pub mod report;
pub mod trainer;

pub use config::{ConfigError, PipelineConfig};
pub use metrics::RegressionMetrics;
pub use models::{FitError, FittedModel, ModelSpec, Regressor};
pub use pipeline::{
    fetch_and_run, run_from_features, run_pipeline, PipelineError, PipelineReport, PipelineServices,
    PipelineStage,
};
pub use ranking::{rank_runs, RankedRun};
pub use recorder::{
    record_with_retry, ExperimentRecorder, JsonlRecorder, RecordError, RunArtifact, RunKind, RunLogEntry,
    RunRecordRequest,
};
pub use report::{export_report, render_markdown, ReportPaths};
pub use trainer::{
    Candidate, CandidateFailure, ExperimentRun, TrainError, Trainer, TrainingMode, TrainingOutcome,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: results and collaborators can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<PipelineConfig>();
        require_sync::<PipelineConfig>();
        require_send::<FittedModel>();
        require_sync::<FittedModel>();
        require_send::<TrainingOutcome>();
        require_sync::<TrainingOutcome>();
        require_send::<PipelineReport>();
        require_sync::<PipelineReport>();
        require_send::<JsonlRecorder>();
        require_sync::<JsonlRecorder>();
    }
}
