//! Interaction features computed row-wise from two fields.

use super::{FeatureDeriver, FeatureFrame};

/// `a * b`, named `<a>_<b>_interaction`.
#[derive(Debug, Clone)]
pub struct Product {
    a: String,
    b: String,
    name: String,
}

impl Product {
    pub fn new(a: &str, b: &str) -> Self {
        Self {
            a: a.to_string(),
            b: b.to_string(),
            name: format!("{a}_{b}_interaction"),
        }
    }
}

impl FeatureDeriver for Product {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<&str> {
        vec![self.a.as_str(), self.b.as_str()]
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        let a = frame.series_or_nan(&self.a);
        let b = frame.series_or_nan(&self.b);
        a.iter().zip(&b).map(|(x, y)| x * y).collect()
    }
}

/// `temp - 0.5 * wind_speed`: a crude apparent-cooling term.
#[derive(Debug, Clone, Default)]
pub struct WindChill;

impl WindChill {
    pub const FACTOR: f64 = 0.5;
}

impl FeatureDeriver for WindChill {
    fn name(&self) -> &str {
        "wind_chill_effect"
    }

    fn inputs(&self) -> Vec<&str> {
        vec!["temp", "wind_speed"]
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        let temp = frame.series_or_nan("temp");
        let wind = frame.series_or_nan("wind_speed");
        temp.iter()
            .zip(&wind)
            .map(|(t, w)| t - Self::FACTOR * w)
            .collect()
    }
}
