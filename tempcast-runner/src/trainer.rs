//! Trainer: fits candidate regressors on a partition, scores and ranks them,
//! and hands each successful run to the experiment recorder.
//!
//! Candidate fits run in parallel (rayon) and are joined in candidate order.
//! A failing candidate becomes a `CandidateFailure` without affecting its
//! siblings. Recording happens afterwards, sequentially, and never fails
//! the training stage.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use tempcast_core::domain::DatasetHash;
use tempcast_core::Partition;

use crate::metrics::RegressionMetrics;
use crate::models::{design_matrix, FitError, FittedModel, ModelSpec, Regressor};
use crate::ranking::{rank_runs, RankedRun};
use crate::recorder::{record_with_retry, ExperimentRecorder, RecordError, RunArtifact, RunKind, RunRecordRequest};

/// A named model configuration to train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(flatten)]
    pub model: ModelSpec,
}

impl Candidate {
    pub fn new(name: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Train the configured default candidate only.
    #[default]
    Single,
    /// Train every configured candidate and rank them.
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// One successfully fitted and scored candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRun {
    pub name: String,
    pub algorithm: String,
    /// Everything logged as run parameters, hyperparameters included.
    pub params: BTreeMap<String, serde_json::Value>,
    pub metrics: RegressionMetrics,
    /// Sorted by importance, descending. `None` for linear models.
    pub feature_importance: Option<Vec<FeatureImportance>>,
    pub feature_names: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Assigned by the recorder; `None` when recording was skipped or failed.
    pub run_id: Option<String>,
    #[serde(skip_serializing)]
    pub model: FittedModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub name: String,
    pub algorithm: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    /// Successful runs in candidate order.
    pub runs: Vec<ExperimentRun>,
    pub failures: Vec<CandidateFailure>,
    pub ranking: Vec<RankedRun>,
    /// Recording problems that were logged and dropped.
    pub recording_warnings: Vec<String>,
}

impl TrainingOutcome {
    /// Lowest test RMSE.
    pub fn best(&self) -> Option<&ExperimentRun> {
        let top = self.ranking.first()?;
        self.runs.iter().find(|r| r.name == top.name)
    }

    pub fn run(&self, name: &str) -> Option<&ExperimentRun> {
        self.runs.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("no candidates to train")]
    NoCandidates,

    #[error("duplicate candidate name '{0}'")]
    DuplicateCandidate(String),

    #[error("all {} candidates failed: {}", .failures.len(), summarize(.failures))]
    AllCandidatesFailed { failures: Vec<CandidateFailure> },
}

fn summarize(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.name, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Trains candidates against one partition and records the results.
pub struct Trainer<'a> {
    experiment: String,
    recorder: Option<&'a dyn ExperimentRecorder>,
    dataset_hash: Option<DatasetHash>,
    tags: BTreeMap<String, String>,
}

impl<'a> Trainer<'a> {
    pub fn new(experiment: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
            recorder: None,
            dataset_hash: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_recorder(mut self, recorder: &'a dyn ExperimentRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_dataset(mut self, hash: DatasetHash) -> Self {
        self.dataset_hash = Some(hash);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn train(&self, partition: &Partition, candidates: &[Candidate]) -> Result<TrainingOutcome, TrainError> {
        if candidates.is_empty() {
            return Err(TrainError::NoCandidates);
        }
        let mut seen = HashSet::new();
        for c in candidates {
            if !seen.insert(c.name.as_str()) {
                return Err(TrainError::DuplicateCandidate(c.name.clone()));
            }
        }

        let n_features = partition.n_features();
        let (x_train, y_train) = design_matrix(&partition.train, n_features);
        let (x_test, y_test) = design_matrix(&partition.test, n_features);
        let data = TrainingData {
            partition,
            x_train: &x_train,
            y_train: &y_train,
            x_test: &x_test,
            y_test: &y_test,
        };

        info!(
            candidates = candidates.len(),
            train = partition.train.len(),
            test = partition.test.len(),
            features = n_features,
            "training started"
        );

        let results: Vec<Result<ExperimentRun, CandidateFailure>> =
            candidates.par_iter().map(|c| fit_candidate(c, &data)).collect();

        let mut runs = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(run) => runs.push(run),
                Err(failure) => {
                    warn!(candidate = %failure.name, error = %failure.error, "candidate failed");
                    failures.push(failure);
                }
            }
        }

        if runs.is_empty() {
            return Err(TrainError::AllCandidatesFailed { failures });
        }

        let mut recording_warnings = Vec::new();
        if let Some(recorder) = self.recorder {
            for run in &mut runs {
                match self.record(recorder, run) {
                    Ok(id) => run.run_id = Some(id),
                    Err(e) => {
                        warn!(run = %run.name, error = %e, "run not recorded");
                        recording_warnings.push(format!("{}: {e}", run.name));
                    }
                }
            }
        }

        let ranking = rank_runs(&runs);
        if let Some(best) = ranking.first() {
            info!(
                best = %best.name,
                test_rmse = best.test_rmse,
                succeeded = runs.len(),
                failed = failures.len(),
                "training finished"
            );
        }

        Ok(TrainingOutcome {
            runs,
            failures,
            ranking,
            recording_warnings,
        })
    }

    fn record(&self, recorder: &dyn ExperimentRecorder, run: &ExperimentRun) -> Result<String, RecordError> {
        let mut artifacts = vec![
            RunArtifact::json("model.json", &run.model)?,
            RunArtifact::json("features.json", &run.feature_names)?,
        ];
        if let Some(importance) = &run.feature_importance {
            artifacts.push(RunArtifact::text("feature_importance.csv", importance_csv(importance)?));
        }

        let mut tags = self.tags.clone();
        tags.insert("algorithm".into(), run.algorithm.clone());

        let request = RunRecordRequest {
            experiment: self.experiment.clone(),
            run_name: run.name.clone(),
            kind: RunKind::Training,
            dataset_hash: self.dataset_hash.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            params: run.params.clone(),
            metrics: run.metrics.to_map(),
            tags,
            artifacts,
        };
        record_with_retry(recorder, &request)
    }
}

struct TrainingData<'p> {
    partition: &'p Partition,
    x_train: &'p Array2<f64>,
    y_train: &'p Array1<f64>,
    x_test: &'p Array2<f64>,
    y_test: &'p Array1<f64>,
}

fn fit_candidate(candidate: &Candidate, data: &TrainingData<'_>) -> Result<ExperimentRun, CandidateFailure> {
    let algorithm = candidate.model.algorithm();
    let fail = |e: FitError| CandidateFailure {
        name: candidate.name.clone(),
        algorithm: algorithm.to_string(),
        error: e.to_string(),
    };

    let started_at = Utc::now();
    let timer = Instant::now();

    let model = candidate.model.fit(data.x_train, data.y_train).map_err(fail)?;
    let train_pred = model.predict(data.x_train).map_err(fail)?;
    let test_pred = model.predict(data.x_test).map_err(fail)?;

    let metrics = RegressionMetrics::compute(
        &data.y_train.to_vec(),
        &train_pred.to_vec(),
        &data.y_test.to_vec(),
        &test_pred.to_vec(),
    );

    let feature_names = data.partition.feature_names.clone();
    let feature_importance = model
        .feature_importances()
        .map(|imp| ranked_importances(&feature_names, &imp));

    let mut params = BTreeMap::from([
        ("model_type".to_string(), json!(algorithm)),
        ("n_features".to_string(), json!(data.partition.n_features())),
        ("n_train_samples".to_string(), json!(data.partition.train.len())),
        ("n_test_samples".to_string(), json!(data.partition.test.len())),
        ("test_size".to_string(), json!(data.partition.test_fraction)),
    ]);
    params.extend(candidate.model.params());

    debug!(
        candidate = %candidate.name,
        algorithm,
        test_rmse = metrics.test_rmse,
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "candidate fitted"
    );

    Ok(ExperimentRun {
        name: candidate.name.clone(),
        algorithm: algorithm.to_string(),
        params,
        metrics,
        feature_importance,
        feature_names,
        started_at,
        finished_at: Utc::now(),
        run_id: None,
        model,
    })
}

/// Pair importances with names, most important first (ties by name).
fn ranked_importances(names: &[String], importances: &[f64]) -> Vec<FeatureImportance> {
    let mut out: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(n, &v)| FeatureImportance {
            feature: n.clone(),
            importance: v,
        })
        .collect();
    out.sort_by(|a, b| b.importance.total_cmp(&a.importance).then_with(|| a.feature.cmp(&b.feature)));
    out
}

/// `feature,importance` CSV, in the given order.
pub fn importance_csv(importance: &[FeatureImportance]) -> Result<String, RecordError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in importance {
        wtr.serialize(row)
            .map_err(|e| RecordError::Serialization(format!("importance csv: {e}")))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| RecordError::Serialization(format!("importance csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| RecordError::Serialization(format!("importance csv: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionTreeParams, RandomForestParams, RidgeParams};
    use chrono::NaiveDate;
    use tempcast_core::FeatureVector;

    /// target = 2·a + b + noise-free, 40 rows, 3 features (c is constant).
    fn partition() -> Partition {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows: Vec<FeatureVector> = (0..40)
            .map(|i| {
                let a = i as f64;
                let b = ((i * 7) % 5) as f64;
                FeatureVector {
                    timestamp: start + chrono::Duration::hours(3 * i as i64),
                    values: vec![a, b, 1.0],
                    target: 2.0 * a + b,
                }
            })
            .collect();
        let (train, test) = rows.split_at(32);
        Partition {
            feature_names: vec!["a".into(), "b".into(), "c".into()],
            target_name: "target".into(),
            test_fraction: 0.2,
            train: train.to_vec(),
            test: test.to_vec(),
        }
    }

    #[test]
    fn successful_and_failed_candidates_are_separated() {
        let candidates = vec![
            Candidate::new("ridge", ModelSpec::Ridge(RidgeParams { alpha: 0.1 })),
            Candidate::new("broken", ModelSpec::Ridge(RidgeParams { alpha: -1.0 })),
        ];
        let outcome = Trainer::new("exp").train(&partition(), &candidates).unwrap();
        assert_eq!(outcome.runs.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].name, "broken");
        assert!(outcome.failures[0].error.contains("alpha"));
    }

    struct Unreachable;

    impl ExperimentRecorder for Unreachable {
        fn record_run(&self, _request: &RunRecordRequest) -> Result<String, RecordError> {
            Err(RecordError::Unavailable("down".into()))
        }
    }

    #[test]
    fn recording_failures_become_warnings_not_errors() {
        let candidates = vec![
            Candidate::new("ridge", ModelSpec::Ridge(RidgeParams { alpha: 0.1 })),
            Candidate::new("tree", ModelSpec::DecisionTree(DecisionTreeParams::default())),
        ];
        let recorder = Unreachable;
        let outcome = Trainer::new("exp")
            .with_recorder(&recorder)
            .train(&partition(), &candidates)
            .unwrap();

        assert_eq!(outcome.runs.len(), 2);
        assert!(outcome.runs.iter().all(|r| r.run_id.is_none()));
        assert_eq!(outcome.recording_warnings.len(), 2);
        assert!(outcome.recording_warnings[0].starts_with("ridge: "));
        assert!(outcome.recording_warnings[1].starts_with("tree: "));
    }

    #[test]
    fn all_failures_is_an_error() {
        let candidates = vec![Candidate::new("broken", ModelSpec::Ridge(RidgeParams { alpha: -1.0 }))];
        let err = Trainer::new("exp").train(&partition(), &candidates).unwrap_err();
        assert!(matches!(err, TrainError::AllCandidatesFailed { ref failures } if failures.len() == 1));
        assert!(err.to_string().starts_with("all 1 candidates failed"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let c = Candidate::new("x", ModelSpec::Linear);
        let err = Trainer::new("exp").train(&partition(), &[c.clone(), c]).unwrap_err();
        assert!(matches!(err, TrainError::DuplicateCandidate(ref n) if n == "x"));
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        assert!(matches!(Trainer::new("exp").train(&partition(), &[]), Err(TrainError::NoCandidates)));
    }

    #[test]
    fn linear_target_ranks_ols_first() {
        let candidates = vec![
            Candidate::new("stump", ModelSpec::DecisionTree(DecisionTreeParams {
                max_depth: Some(1),
                ..Default::default()
            })),
            Candidate::new("ols", ModelSpec::Linear),
        ];
        let outcome = Trainer::new("exp").train(&partition(), &candidates).unwrap();
        assert_eq!(outcome.best().unwrap().name, "ols");
        assert!(outcome.run("ols").unwrap().metrics.test_rmse < 1e-6);
        // candidate order is preserved in `runs`
        assert_eq!(outcome.runs[0].name, "stump");
    }

    #[test]
    fn logged_params_include_shape_and_hyperparameters() {
        let candidates = vec![Candidate::new("rf", ModelSpec::RandomForest(RandomForestParams {
            n_estimators: 5,
            ..Default::default()
        }))];
        let outcome = Trainer::new("exp").train(&partition(), &candidates).unwrap();
        let params = &outcome.runs[0].params;
        assert_eq!(params["model_type"], json!("random_forest"));
        assert_eq!(params["n_features"], json!(3));
        assert_eq!(params["n_train_samples"], json!(32));
        assert_eq!(params["n_test_samples"], json!(8));
        assert_eq!(params["test_size"], json!(0.2));
        assert_eq!(params["n_estimators"], json!(5));
    }

    #[test]
    fn importances_are_sorted_descending() {
        let ranked = ranked_importances(&["a".into(), "b".into(), "c".into()], &[0.2, 0.7, 0.1]);
        let names: Vec<&str> = ranked.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        let csv = importance_csv(&ranked).unwrap();
        assert_eq!(csv.lines().next().unwrap(), "feature,importance");
        assert_eq!(csv.lines().nth(1).unwrap(), "b,0.7");
    }

    #[test]
    fn tree_runs_carry_importances_linear_runs_do_not() {
        let candidates = vec![
            Candidate::new("tree", ModelSpec::DecisionTree(DecisionTreeParams::default())),
            Candidate::new("ols", ModelSpec::Linear),
        ];
        let outcome = Trainer::new("exp").train(&partition(), &candidates).unwrap();
        assert!(outcome.run("tree").unwrap().feature_importance.is_some());
        assert!(outcome.run("ols").unwrap().feature_importance.is_none());
    }
}
