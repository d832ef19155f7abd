//! Forecast target: value of a field `horizon` rows ahead.
//!
//! Lookahead: horizon (undefined for the last `horizon` rows).

use super::{FeatureDeriver, FeatureFrame};

#[derive(Debug, Clone)]
pub struct Target {
    field: String,
    horizon: usize,
    name: String,
}

impl Target {
    pub fn new(field: &str, horizon: usize) -> Self {
        assert!(horizon >= 1, "target horizon must be >= 1");
        Self {
            field: field.to_string(),
            horizon,
            name: format!("target_{field}_{horizon}step"),
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }
}

impl FeatureDeriver for Target {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn lookahead(&self) -> usize {
        self.horizon
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        let values = frame.series_or_nan(&self.field);
        let n = values.len();
        let mut result = vec![f64::NAN; n];
        for i in 0..n.saturating_sub(self.horizon) {
            result[i] = values[i + self.horizon];
        }
        result
    }
}
