//! Experiment recording: trait plus a file-backed JSONL implementation.
//!
//! The trainer hands each finished run to an `ExperimentRecorder`. Recording
//! is best-effort: `record_with_retry` tries twice, logs, and gives up.
//!
//! `JsonlRecorder` layout:
//!
//! ```text
//! <root>/<experiment>/runs.jsonl          one RunLogEntry per line
//! <root>/<experiment>/<run_id>/<artifact> model.json, features.json, ...
//! ```
//!
//! Artifacts are written before the log line, so every logged run has its
//! files on disk.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tempcast_core::data::{sanitize, write_atomic};
use tempcast_core::domain::{DatasetHash, RunId};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("recorder I/O error: {0}")]
    Io(String),

    #[error("recorder serialization error: {0}")]
    Serialization(String),

    #[error("recorder unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Training,
    Profiling,
}

/// A named file attached to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RunArtifact {
    pub fn json<T: Serialize + ?Sized>(file_name: &str, value: &T) -> Result<Self, RecordError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| RecordError::Serialization(format!("{file_name}: {e}")))?;
        Ok(Self {
            file_name: file_name.to_string(),
            bytes,
        })
    }

    pub fn text(file_name: &str, content: String) -> Self {
        Self {
            file_name: file_name.to_string(),
            bytes: content.into_bytes(),
        }
    }
}

/// Everything the recorder persists for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecordRequest {
    pub experiment: String,
    pub run_name: String,
    pub kind: RunKind,
    pub dataset_hash: Option<DatasetHash>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub params: BTreeMap<String, serde_json::Value>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<RunArtifact>,
}

/// Persists runs. Returns the recorder-assigned run id.
pub trait ExperimentRecorder: Send + Sync {
    fn record_run(&self, request: &RunRecordRequest) -> Result<String, RecordError>;
}

/// Record once, retry once on failure, then give up with a warning.
pub fn record_with_retry(
    recorder: &dyn ExperimentRecorder,
    request: &RunRecordRequest,
) -> Result<String, RecordError> {
    match recorder.record_run(request) {
        Ok(id) => Ok(id),
        Err(first) => {
            warn!(run = %request.run_name, error = %first, "recording failed, retrying once");
            recorder.record_run(request).map_err(|second| {
                warn!(run = %request.run_name, error = %second, "recording failed again, dropping run record");
                second
            })
        }
    }
}

// ── JSONL recorder ───────────────────────────────────────────────────

/// One line of `runs.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: String,
    pub experiment: String,
    pub run_name: String,
    pub kind: RunKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_hash: Option<DatasetHash>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub params: BTreeMap<String, serde_json::Value>,
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<String>,
}

pub struct JsonlRecorder {
    root: PathBuf,
}

impl JsonlRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment_dir(&self, experiment: &str) -> PathBuf {
        let name = sanitize(experiment);
        let name = if name.chars().all(|c| c == '.') { "_".to_string() } else { name };
        self.root.join(name)
    }

    pub fn log_path(&self, experiment: &str) -> PathBuf {
        self.experiment_dir(experiment).join("runs.jsonl")
    }

    /// Read every run logged for `experiment`. Malformed lines are skipped.
    pub fn read_runs(&self, experiment: &str) -> Result<Vec<RunLogEntry>, RecordError> {
        let path = self.log_path(experiment);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecordError::Io(format!("open {}: {e}", path.display()))),
        };

        let mut entries = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|e| RecordError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(error = %e, "skipping malformed run log line"),
            }
        }
        Ok(entries)
    }

    /// Create a fresh run directory, suffixing the id on collision.
    fn create_run_dir(&self, exp_dir: &Path, base_id: &str) -> Result<(String, PathBuf), RecordError> {
        for k in 0..1000 {
            let id = if k == 0 { base_id.to_string() } else { format!("{base_id}-{k}") };
            let dir = exp_dir.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(RecordError::Io(format!("create {}: {e}", dir.display()))),
            }
        }
        Err(RecordError::Io(format!("no free run directory for id {base_id}")))
    }
}

impl ExperimentRecorder for JsonlRecorder {
    fn record_run(&self, request: &RunRecordRequest) -> Result<String, RecordError> {
        let exp_dir = self.experiment_dir(&request.experiment);
        fs::create_dir_all(&exp_dir)
            .map_err(|e| RecordError::Io(format!("create {}: {e}", exp_dir.display())))?;

        let dataset = request
            .dataset_hash
            .clone()
            .unwrap_or_else(|| DatasetHash(String::new()));
        let base = RunId::derive(
            &request.experiment,
            &request.run_name,
            &dataset,
            request.started_at.timestamp_millis(),
        );
        let (run_id, run_dir) = self.create_run_dir(&exp_dir, &base.0)?;

        // A run that never reaches the log leaves no directory behind.
        if let Err(e) = self.write_run(&exp_dir, &run_id, &run_dir, request) {
            if let Err(cleanup) = fs::remove_dir_all(&run_dir) {
                warn!(run_dir = %run_dir.display(), error = %cleanup, "could not remove partial run directory");
            }
            return Err(e);
        }

        debug!(run_id = %run_id, run = %request.run_name, "run recorded");
        Ok(run_id)
    }
}

impl JsonlRecorder {
    fn write_run(
        &self,
        exp_dir: &Path,
        run_id: &str,
        run_dir: &Path,
        request: &RunRecordRequest,
    ) -> Result<(), RecordError> {
        let mut artifact_names = Vec::with_capacity(request.artifacts.len());
        for artifact in &request.artifacts {
            let name = sanitize(&artifact.file_name);
            write_atomic(&run_dir.join(&name), &artifact.bytes)
                .map_err(|e| RecordError::Io(e.to_string()))?;
            artifact_names.push(name);
        }

        let entry = RunLogEntry {
            run_id: run_id.to_string(),
            experiment: request.experiment.clone(),
            run_name: request.run_name.clone(),
            kind: request.kind,
            dataset_hash: request.dataset_hash.clone(),
            started_at: request.started_at,
            finished_at: request.finished_at,
            params: request.params.clone(),
            // JSON has no NaN; such metrics are left out of the log line.
            metrics: request
                .metrics
                .iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            tags: request.tags.clone(),
            artifacts: artifact_names,
        };
        let json = serde_json::to_string(&entry).map_err(|e| RecordError::Serialization(e.to_string()))?;

        let log = exp_dir.join("runs.jsonl");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(|e| RecordError::Io(format!("open {}: {e}", log.display())))?;
        writeln!(file, "{json}").map_err(|e| RecordError::Io(e.to_string()))?;
        file.flush().map_err(|e| RecordError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(name: &str) -> RunRecordRequest {
        let t = DateTime::from_timestamp(1_720_000_000, 0).unwrap();
        RunRecordRequest {
            experiment: "exp".into(),
            run_name: name.into(),
            kind: RunKind::Training,
            dataset_hash: Some(DatasetHash("ab".repeat(32))),
            started_at: t,
            finished_at: t,
            params: BTreeMap::from([("model_type".to_string(), serde_json::json!("ridge"))]),
            metrics: BTreeMap::from([("test_rmse".to_string(), 1.25)]),
            tags: BTreeMap::new(),
            artifacts: vec![RunArtifact::text("notes.txt", "hello".into())],
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl ExperimentRecorder for Flaky {
        fn record_run(&self, _request: &RunRecordRequest) -> Result<String, RecordError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(RecordError::Unavailable("backend down".into()))
            } else {
                Ok(format!("run-{n}"))
            }
        }
    }

    #[test]
    fn records_log_line_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path());
        let id = recorder.record_run(&request("ridge_alpha1.0")).unwrap();

        let runs = recorder.read_runs("exp").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, id);
        assert_eq!(runs[0].metrics["test_rmse"], 1.25);
        assert_eq!(runs[0].artifacts, vec!["notes.txt"]);
        let notes = fs::read_to_string(recorder.experiment_dir("exp").join(&id).join("notes.txt")).unwrap();
        assert_eq!(notes, "hello");
    }

    #[test]
    fn identical_requests_get_distinct_run_ids() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path());
        let a = recorder.record_run(&request("same")).unwrap();
        let b = recorder.record_run(&request("same")).unwrap();
        assert_ne!(a, b);
        assert!(b.starts_with(&a));
        assert_eq!(recorder.read_runs("exp").unwrap().len(), 2);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path());
        recorder.record_run(&request("a")).unwrap();
        let mut f = OpenOptions::new().append(true).open(recorder.log_path("exp")).unwrap();
        writeln!(f, "{{not json").unwrap();
        assert_eq!(recorder.read_runs("exp").unwrap().len(), 1);
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonlRecorder::new(dir.path()).read_runs("nothing").unwrap().is_empty());
    }

    #[test]
    fn retry_recovers_from_one_failure() {
        let flaky = Flaky { failures: 1, calls: AtomicUsize::new(0) };
        assert_eq!(record_with_retry(&flaky, &request("x")).unwrap(), "run-1");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retry_gives_up_after_two_attempts() {
        let flaky = Flaky { failures: 5, calls: AtomicUsize::new(0) };
        assert!(record_with_retry(&flaky, &request("x")).is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_artifact_write_leaves_no_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path());
        let mut req = request("broken");
        // ".." resolves to the experiment directory, so the rename fails.
        req.artifacts.push(RunArtifact::text("..", "x".into()));

        assert!(recorder.record_run(&req).is_err());

        let exp_dir = recorder.experiment_dir("exp");
        let leftovers: Vec<_> = fs::read_dir(&exp_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect();
        assert!(leftovers.is_empty(), "orphan run dirs: {leftovers:?}");
        assert!(recorder.read_runs("exp").unwrap().is_empty());
    }

    #[test]
    fn experiment_names_are_path_safe() {
        let recorder = JsonlRecorder::new("/tmp/root");
        assert_eq!(recorder.experiment_dir("a/b"), PathBuf::from("/tmp/root/a_b"));
        assert_eq!(recorder.experiment_dir(".."), PathBuf::from("/tmp/root/_"));
    }
}
