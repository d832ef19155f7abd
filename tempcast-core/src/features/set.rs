//! Feature set: the fully defined rows produced by the feature engine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One eligible timestamp: every feature and the target are defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub timestamp: NaiveDateTime,
    pub values: Vec<f64>,
    pub target: f64,
}

/// Time-ordered feature rows with their column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub rows: Vec<FeatureVector>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.target).collect()
    }

    /// Values of one feature column, or `None` for an unknown name.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.feature_names.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Canonical serialized form. Identical sets produce identical bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Every value and target is finite and every row has one value per name.
    pub fn is_fully_defined(&self) -> bool {
        self.rows.iter().all(|r| {
            r.values.len() == self.feature_names.len()
                && r.values.iter().all(|v| v.is_finite())
                && r.target.is_finite()
        })
    }
}
