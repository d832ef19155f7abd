//! Rolling statistics over a trailing window ending at the current row.
//!
//! The window at row `t` covers `[t - window + 1, t]`, so the current
//! observation is included. Lookback: window - 1. A window containing an
//! unknown value yields NaN.

use super::{FeatureDeriver, FeatureFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingStat {
    Mean,
    /// Sample standard deviation (n - 1 denominator).
    Std,
    Min,
    Max,
}

impl RollingStat {
    pub const ALL: [RollingStat; 4] = [
        RollingStat::Mean,
        RollingStat::Std,
        RollingStat::Min,
        RollingStat::Max,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RollingStat::Mean => "mean",
            RollingStat::Std => "std",
            RollingStat::Min => "min",
            RollingStat::Max => "max",
        }
    }

    fn apply(self, window: &[f64]) -> f64 {
        let n = window.len() as f64;
        match self {
            RollingStat::Mean => window.iter().sum::<f64>() / n,
            RollingStat::Std => {
                let mean = window.iter().sum::<f64>() / n;
                let ss: f64 = window.iter().map(|v| (v - mean).powi(2)).sum();
                (ss / (n - 1.0)).sqrt()
            }
            RollingStat::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            RollingStat::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rolling {
    field: String,
    window: usize,
    stat: RollingStat,
    name: String,
}

impl Rolling {
    pub fn new(field: &str, window: usize, stat: RollingStat) -> Self {
        assert!(window >= 2, "rolling window must be >= 2");
        Self {
            field: field.to_string(),
            window,
            stat,
            name: format!("{field}_rolling_{}_{window}", stat.label()),
        }
    }
}

impl FeatureDeriver for Rolling {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        let values = frame.series_or_nan(&self.field);
        let n = values.len();
        let mut result = vec![f64::NAN; n];
        if n < self.window {
            return result;
        }
        for (i, window) in values.windows(self.window).enumerate() {
            if window.iter().any(|v| v.is_nan()) {
                continue;
            }
            result[i + self.window - 1] = self.stat.apply(window);
        }
        result
    }
}
