//! Lag feature: value of a field `depth` rows earlier.
//!
//! Lookback: depth (undefined for the first `depth` rows).

use super::{FeatureDeriver, FeatureFrame};

#[derive(Debug, Clone)]
pub struct Lag {
    field: String,
    depth: usize,
    name: String,
}

impl Lag {
    pub fn new(field: &str, depth: usize) -> Self {
        Self {
            field: field.to_string(),
            depth,
            name: format!("{field}_lag_{depth}"),
        }
    }
}

impl FeatureDeriver for Lag {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn lookback(&self) -> usize {
        self.depth
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        let values = frame.series_or_nan(&self.field);
        let n = values.len();
        let mut result = vec![f64::NAN; n];
        for i in self.depth..n {
            result[i] = values[i - self.depth];
        }
        result
    }
}
