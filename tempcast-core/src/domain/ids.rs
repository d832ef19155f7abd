use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic dataset hash (content hash of the normalized batch)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// First 12 hex chars, for log lines and file names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checksum of a serialized feature table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureChecksum(pub String);

impl fmt::Display for FeatureChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned to an experiment run by the recorder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Derive a run id from the experiment name, candidate name, dataset and start time.
    /// Uses BLAKE3 so ids are stable across builds/platforms.
    pub fn derive(experiment: &str, candidate: &str, dataset: &DatasetHash, started_at_ms: i64) -> Self {
        use serde_json::json;

        let canonical = json!({
            "candidate": candidate,
            "dataset_hash": &dataset.0,
            "experiment": experiment,
            "started_at_ms": started_at_ms,
        });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        Self(hash.to_hex()[..16].to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
