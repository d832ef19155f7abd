//! Difference feature: `value[t] - value[t - period]`.
//!
//! Lookback: period.

use super::{FeatureDeriver, FeatureFrame};

#[derive(Debug, Clone)]
pub struct Difference {
    field: String,
    period: usize,
    name: String,
}

impl Difference {
    pub fn new(field: &str, period: usize) -> Self {
        assert!(period >= 1, "difference period must be >= 1");
        Self {
            field: field.to_string(),
            period,
            name: format!("{field}_diff_{period}"),
        }
    }
}

impl FeatureDeriver for Difference {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        let values = frame.series_or_nan(&self.field);
        let n = values.len();
        let mut result = vec![f64::NAN; n];
        for i in self.period..n {
            result[i] = values[i] - values[i - self.period];
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_frame, DEFAULT_EPSILON};

    #[test]
    fn first_order_difference() {
        let frame = make_frame(&[("pressure", &[1000.0, 1002.5, 1001.0])]);
        let result = Difference::new("pressure", 1).compute(&frame);
        assert!(result[0].is_nan());
        assert_approx(result[1], 2.5, DEFAULT_EPSILON);
        assert_approx(result[2], -1.5, DEFAULT_EPSILON);
    }

    #[test]
    fn two_step_difference() {
        let frame = make_frame(&[("temp", &[10.0, 12.0, 15.0, 11.0])]);
        let d = Difference::new("temp", 2);
        let result = d.compute(&frame);
        assert_eq!(d.lookback(), 2);
        assert!(result[1].is_nan());
        assert_approx(result[2], 5.0, DEFAULT_EPSILON);
        assert_approx(result[3], -1.0, DEFAULT_EPSILON);
    }
}
