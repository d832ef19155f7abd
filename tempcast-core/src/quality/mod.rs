//! Quality gate: threshold-based admission control for a normalized batch.
//!
//! The gate is the single fail-fast point of a run. Rules:
//! - every monitored field present in the schema must have an unknown ratio
//!   at or below `null_ratio_threshold`
//! - every required field must appear in the schema
//! - the batch must carry at least `min_rows` records
//!
//! All violations are collected before the verdict is returned. Value-range
//! breaches are advisory warnings only.

pub mod report;

pub use report::{FieldQuality, QualityReport, RangeWarning, RuleViolation};

use crate::domain::NormalizedBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// Inclusive plausible range for a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum QualityConfigError {
    #[error("null_ratio_threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("value range for '{field}' has min {min} above max {max}")]
    InvalidRange { field: String, min: f64, max: f64 },
}

/// Gate thresholds. Passed explicitly to [`evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub null_ratio_threshold: f64,
    pub monitored_fields: Vec<String>,
    pub required_fields: Vec<String>,
    /// Minimum record count. `None` defers to the feature configuration's
    /// minimum history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rows: Option<usize>,
    pub value_ranges: BTreeMap<String, ValueRange>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            null_ratio_threshold: 0.01,
            monitored_fields: ["temp", "feels_like", "pressure", "humidity"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            required_fields: ["temp", "pressure", "humidity"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_rows: None,
            value_ranges: BTreeMap::from([(
                "temp".to_string(),
                ValueRange {
                    min: -10.0,
                    max: 50.0,
                },
            )]),
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<(), QualityConfigError> {
        if !(0.0..=1.0).contains(&self.null_ratio_threshold) {
            return Err(QualityConfigError::InvalidThreshold(
                self.null_ratio_threshold,
            ));
        }
        for (field, range) in &self.value_ranges {
            if range.min > range.max {
                return Err(QualityConfigError::InvalidRange {
                    field: field.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    /// Fill an unset `min_rows` with the given default.
    pub fn with_default_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows.get_or_insert(min_rows);
        self
    }
}

/// Evaluate a normalized batch against the gate. Never fails; a failed
/// verdict is carried in the report.
pub fn evaluate(batch: &NormalizedBatch, config: &QualityConfig) -> QualityReport {
    let row_count = batch.len();
    let mut violations = Vec::new();
    let mut fields = Vec::with_capacity(config.monitored_fields.len());

    for field in &config.monitored_fields {
        let present = batch.schema.contains(field);
        let unknown_count = batch.unknown_count(field);
        let null_ratio = present.then(|| {
            if row_count == 0 {
                1.0
            } else {
                unknown_count as f64 / row_count as f64
            }
        });
        if let Some(ratio) = null_ratio {
            if ratio > config.null_ratio_threshold {
                violations.push(RuleViolation::NullRatioExceeded {
                    field: field.clone(),
                    ratio,
                    threshold: config.null_ratio_threshold,
                });
            }
        }
        fields.push(FieldQuality {
            field: field.clone(),
            present,
            unknown_count,
            null_ratio,
        });
    }

    for field in &config.required_fields {
        if !batch.schema.contains(field) {
            violations.push(RuleViolation::MissingRequiredField {
                field: field.clone(),
            });
        }
    }

    let required_rows = config.min_rows.unwrap_or(1);
    if row_count < required_rows {
        violations.push(RuleViolation::InsufficientRows {
            found: row_count,
            required: required_rows,
        });
    }

    let warnings = range_warnings(batch, config);
    for w in &warnings {
        warn!(warning = %w, "value range check");
    }

    let passed = violations.is_empty();
    let report = QualityReport {
        row_count,
        fields,
        passed,
        violations,
        warnings,
    };
    info!(rows = row_count, passed, "{report}");
    report
}

fn range_warnings(batch: &NormalizedBatch, config: &QualityConfig) -> Vec<RangeWarning> {
    config
        .value_ranges
        .iter()
        .filter(|(field, _)| batch.schema.contains(field))
        .filter_map(|(field, range)| {
            let values: Vec<f64> = batch
                .numeric_column(field)
                .into_iter()
                .filter(|v| !v.is_nan())
                .collect();
            let out_of_range = values
                .iter()
                .filter(|v| **v < range.min || **v > range.max)
                .count();
            (out_of_range > 0).then(|| RangeWarning {
                field: field.clone(),
                min: range.min,
                max: range.max,
                out_of_range,
                observed_min: values.iter().copied().fold(f64::INFINITY, f64::min),
                observed_max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        })
        .collect()
}
