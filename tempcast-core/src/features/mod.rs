//! Feature engine: derives a fixed feature representation from a
//! quality-passed batch.
//!
//! Every derived column implements [`FeatureDeriver`]. A deriver reports how
//! many past rows (`lookback`) and future rows (`lookahead`) it needs and
//! yields NaN wherever it is undefined. The engine drops any row with an
//! undefined feature or target; values are never imputed.
//!
//! Multi-output transforms (rolling statistics, sin/cos encodings) are exposed
//! as one named deriver per output column, keeping the trait single-series.

pub mod calendar;
pub mod diff;
pub mod engine;
pub mod interaction;
pub mod lag;
pub mod passthrough;
pub mod profile;
pub mod rolling;
pub mod set;
pub mod target;

pub use calendar::{Calendar, CalendarField, Cyclical, IsDay, Wave};
pub use diff::Difference;
pub use engine::FeatureEngine;
pub use interaction::{Product, WindChill};
pub use lag::Lag;
pub use passthrough::Passthrough;
pub use profile::{ColumnProfile, DatasetProfile};
pub use rolling::{Rolling, RollingStat};
pub use set::{FeatureSet, FeatureVector};
pub use target::Target;

use crate::domain::NormalizedBatch;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("invalid feature configuration: {0}")]
    InvalidConfig(String),

    #[error("feature input '{field}' is not present in the batch schema")]
    UnknownField { field: String },

    #[error(
        "horizon exceeds available history: {available} rows cannot cover lookback {lookback} + horizon {horizon}"
    )]
    InsufficientHistory {
        available: usize,
        lookback: usize,
        horizon: usize,
    },
}

/// Feature derivation settings. Passed explicitly to [`FeatureEngine::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Depths applied to every field in `lag_fields`.
    pub lag_depths: Vec<usize>,
    pub lag_fields: Vec<String>,
    /// Fields that only get a single-step lag.
    pub context_lag_fields: Vec<String>,
    /// Trailing window sizes, inclusive of the current row.
    pub rolling_windows: Vec<usize>,
    pub rolling_fields: Vec<String>,
    pub diff_periods: Vec<usize>,
    pub diff_fields: Vec<String>,
    /// Pairs multiplied into `<a>_<b>_interaction`.
    pub interactions: Vec<[String; 2]>,
    pub wind_chill: bool,
    pub calendar: bool,
    pub cyclical: bool,
    /// Raw fields copied through as features.
    pub base_fields: Vec<String>,
    pub target_field: String,
    /// Steps ahead the target is shifted.
    pub horizon_steps: usize,
    /// Fraction of rows held out for evaluation.
    pub test_fraction: f64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lag_depths: vec![1, 2, 3, 4],
            lag_fields: strings(&["temp"]),
            context_lag_fields: strings(&["pressure", "humidity", "wind_speed"]),
            rolling_windows: vec![3, 6],
            rolling_fields: strings(&["temp"]),
            diff_periods: vec![1, 2],
            diff_fields: strings(&["temp", "pressure"]),
            interactions: vec![
                ["temp".to_string(), "pressure".to_string()],
                ["temp".to_string(), "humidity".to_string()],
            ],
            wind_chill: true,
            calendar: true,
            cyclical: true,
            base_fields: strings(&[
                "temp",
                "feels_like",
                "temp_min",
                "temp_max",
                "pressure",
                "humidity",
                "clouds_all",
                "wind_speed",
                "wind_deg",
            ]),
            target_field: "temp".to_string(),
            horizon_steps: 2,
            test_fraction: 0.2,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.lag_depths.iter().any(|&d| d == 0) {
            return Err(FeatureError::InvalidConfig(
                "lag depths must be >= 1".into(),
            ));
        }
        if let Some(w) = self.rolling_windows.iter().find(|&&w| w < 2) {
            return Err(FeatureError::InvalidConfig(format!(
                "rolling window {w} is too small (must be >= 2)"
            )));
        }
        if self.diff_periods.iter().any(|&p| p == 0) {
            return Err(FeatureError::InvalidConfig(
                "diff periods must be >= 1".into(),
            ));
        }
        if self.horizon_steps == 0 {
            return Err(FeatureError::InvalidConfig(
                "horizon_steps must be >= 1".into(),
            ));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(FeatureError::InvalidConfig(format!(
                "test_fraction must be within (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.target_field.is_empty() {
            return Err(FeatureError::InvalidConfig("target_field is empty".into()));
        }
        Ok(())
    }
}

/// Column-oriented view of a normalized batch, built once per run.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    timestamps: Vec<NaiveDateTime>,
    numeric: BTreeMap<String, Vec<f64>>,
    text: BTreeMap<String, Vec<Option<String>>>,
}

impl FeatureFrame {
    pub fn from_batch(batch: &NormalizedBatch) -> Self {
        let mut numeric = BTreeMap::new();
        let mut text = BTreeMap::new();
        for field in batch.schema.fields() {
            numeric.insert(field.clone(), batch.numeric_column(field));
            text.insert(
                field.clone(),
                batch
                    .records
                    .iter()
                    .map(|r| r.get(field).as_text().map(str::to_string))
                    .collect(),
            );
        }
        Self {
            timestamps: batch.timestamps(),
            numeric,
            text,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Numeric series for `field`. Unknown and text cells are NaN.
    pub fn series(&self, field: &str) -> Option<&[f64]> {
        self.numeric.get(field).map(Vec::as_slice)
    }

    pub fn text(&self, field: &str) -> Option<&[Option<String>]> {
        self.text.get(field).map(Vec::as_slice)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.numeric.contains_key(field)
    }

    /// Series for `field`, or all-NaN when the field is absent.
    pub(crate) fn series_or_nan(&self, field: &str) -> Vec<f64> {
        self.series(field)
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![f64::NAN; self.len()])
    }
}

/// A single derived feature column.
pub trait FeatureDeriver: Send + Sync {
    /// Output column name.
    fn name(&self) -> &str;

    /// Schema fields this deriver reads.
    fn inputs(&self) -> Vec<&str>;

    /// Rows before `t` needed to define the value at `t`.
    fn lookback(&self) -> usize {
        0
    }

    /// Rows after `t` needed to define the value at `t`.
    fn lookahead(&self) -> usize {
        0
    }

    /// One value per frame row; NaN where undefined.
    fn compute(&self, frame: &FeatureFrame) -> Vec<f64>;
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for feature tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Build a 3-hourly frame with the given numeric columns.
#[cfg(test)]
pub fn make_frame(columns: &[(&str, &[f64])]) -> FeatureFrame {
    use crate::domain::{FieldValue, NormalizedRecord, Schema};

    let n = columns.first().map_or(0, |(_, v)| v.len());
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let records = (0..n)
        .map(|i| NormalizedRecord {
            timestamp: start + chrono::Duration::hours(3 * i as i64),
            fields: columns
                .iter()
                .map(|(name, values)| {
                    let v = if values[i].is_nan() {
                        FieldValue::Unknown
                    } else {
                        FieldValue::Number(values[i])
                    };
                    (name.to_string(), v)
                })
                .collect(),
        })
        .collect();
    let schema = Schema::new(columns.iter().map(|(name, _)| name.to_string()).collect());
    FeatureFrame::from_batch(&NormalizedBatch { records, schema })
}
