//! Raw field copied through unchanged. Unknown cells stay NaN.

use super::{FeatureDeriver, FeatureFrame};

#[derive(Debug, Clone)]
pub struct Passthrough {
    field: String,
}

impl Passthrough {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }
}

impl FeatureDeriver for Passthrough {
    fn name(&self) -> &str {
        &self.field
    }

    fn inputs(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        frame.series_or_nan(&self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::make_frame;

    #[test]
    fn copies_values_and_keeps_unknowns() {
        let frame = make_frame(&[("humidity", &[40.0, f64::NAN, 42.0])]);
        let result = Passthrough::new("humidity").compute(&frame);
        assert_eq!(result[0], 40.0);
        assert!(result[1].is_nan());
        assert_eq!(result[2], 42.0);
    }
}
