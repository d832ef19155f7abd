//! Normalized tabular records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cell of a normalized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// Absent or null in the raw payload. Never coerced to zero.
    Unknown,
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, FieldValue::Unknown)
    }
}

/// One row per raw observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub timestamp: NaiveDateTime,
    pub fields: BTreeMap<String, FieldValue>,
}

impl NormalizedRecord {
    /// Value of `field`, or `Unknown` if the record does not carry it.
    pub fn get(&self, field: &str) -> &FieldValue {
        static UNKNOWN: FieldValue = FieldValue::Unknown;
        self.fields.get(field).unwrap_or(&UNKNOWN)
    }
}

/// Fields observed in a batch, in catalogue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Output of the schema normalizer: records sorted by strictly increasing
/// timestamp, plus the set of fields that appeared in the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    pub schema: Schema,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.records.iter().map(|r| r.timestamp).collect()
    }

    /// Numeric view of a column. Unknown and text cells become NaN.
    pub fn numeric_column(&self, field: &str) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| r.get(field).as_f64().unwrap_or(f64::NAN))
            .collect()
    }

    /// Number of records whose `field` is Unknown.
    pub fn unknown_count(&self, field: &str) -> usize {
        self.records.iter().filter(|r| r.get(field).is_unknown()).count()
    }
}
