//! Quality report types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Completeness of one monitored field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuality {
    pub field: String,
    /// Whether the field's key appeared anywhere in the batch.
    pub present: bool,
    pub unknown_count: usize,
    /// `unknown_count / row_count`, 1.0 for an empty batch. `None` when the
    /// field is absent from the schema.
    pub null_ratio: Option<f64>,
}

/// A violated gate rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleViolation {
    NullRatioExceeded {
        field: String,
        ratio: f64,
        threshold: f64,
    },
    MissingRequiredField {
        field: String,
    },
    InsufficientRows {
        found: usize,
        required: usize,
    },
}

impl RuleViolation {
    /// Stable rule label, e.g. `null_ratio_exceeded:temp`.
    pub fn rule(&self) -> String {
        match self {
            RuleViolation::NullRatioExceeded { field, .. } => format!("null_ratio_exceeded:{field}"),
            RuleViolation::MissingRequiredField { field } => {
                format!("missing_required_field:{field}")
            }
            RuleViolation::InsufficientRows { .. } => "insufficient_rows".to_string(),
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleViolation::NullRatioExceeded {
                field,
                ratio,
                threshold,
            } => write!(
                f,
                "{}: {:.2}% unknown exceeds {:.2}%",
                self.rule(),
                ratio * 100.0,
                threshold * 100.0
            ),
            RuleViolation::MissingRequiredField { .. } => {
                write!(f, "{}: field absent from batch", self.rule())
            }
            RuleViolation::InsufficientRows { found, required } => {
                write!(f, "{}: {found} rows, need at least {required}", self.rule())
            }
        }
    }
}

/// Advisory finding that does not fail the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeWarning {
    pub field: String,
    pub min: f64,
    pub max: f64,
    pub out_of_range: usize,
    pub observed_min: f64,
    pub observed_max: f64,
}

impl fmt::Display for RangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} values outside [{}, {}] (observed {:.2}..{:.2})",
            self.field, self.out_of_range, self.min, self.max, self.observed_min, self.observed_max
        )
    }
}

/// Outcome of the quality gate. Produced once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub row_count: usize,
    pub fields: Vec<FieldQuality>,
    pub passed: bool,
    pub violations: Vec<RuleViolation>,
    pub warnings: Vec<RangeWarning>,
}

impl QualityReport {
    /// Rule labels of every violation, in evaluation order.
    pub fn violated_rules(&self) -> Vec<String> {
        self.violations.iter().map(RuleViolation::rule).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldQuality> {
        self.fields.iter().find(|f| f.field == name)
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        write!(f, "quality gate {verdict} ({} rows", self.row_count)?;
        if !self.violations.is_empty() {
            write!(f, "; violations: {}", self.violated_rules().join(", "))?;
        }
        write!(f, ")")
    }
}
