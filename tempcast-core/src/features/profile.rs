//! Descriptive statistics of a feature set, one entry per column.

use super::FeatureSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0.0 for a single value.
    pub std: f64,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub rows: usize,
    /// Feature columns plus the target.
    pub columns: usize,
    pub stats: Vec<ColumnProfile>,
}

impl DatasetProfile {
    /// Profile every feature column and the target, in column order.
    pub fn from_feature_set(set: &FeatureSet) -> Self {
        let mut stats: Vec<ColumnProfile> = set
            .feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<f64> = set.rows.iter().map(|r| r.values[i]).collect();
                describe(name, &values)
            })
            .collect();
        stats.push(describe(&set.target_name, &set.targets()));
        Self {
            rows: set.len(),
            columns: stats.len(),
            stats,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.stats.iter().find(|c| c.name == name)
    }
}

/// Summary statistics with linearly interpolated quantiles.
pub fn describe(name: &str, values: &[f64]) -> ColumnProfile {
    let count = values.len();
    if count == 0 {
        return ColumnProfile {
            name: name.to_string(),
            count,
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            p25: f64::NAN,
            p50: f64::NAN,
            p75: f64::NAN,
            max: f64::NAN,
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if count > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    ColumnProfile {
        name: name.to_string(),
        count,
        mean,
        std,
        min: sorted[0],
        p25: quantile(&sorted, 0.25),
        p50: quantile(&sorted, 0.50),
        p75: quantile(&sorted, 0.75),
        max: sorted[count - 1],
    }
}

/// Quantile of already sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, FeatureVector, DEFAULT_EPSILON};

    #[test]
    fn describe_matches_hand_computation() {
        let p = describe("x", &[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(p.count, 4);
        assert_approx(p.mean, 2.5, DEFAULT_EPSILON);
        assert_approx(p.std, 1.290_994_448_735_805_6, 1e-12);
        assert_eq!(p.min, 1.0);
        assert_approx(p.p25, 1.75, DEFAULT_EPSILON);
        assert_approx(p.p50, 2.5, DEFAULT_EPSILON);
        assert_approx(p.p75, 3.25, DEFAULT_EPSILON);
        assert_eq!(p.max, 4.0);
    }

    #[test]
    fn single_value_has_zero_std() {
        let p = describe("x", &[7.0]);
        assert_eq!(p.std, 0.0);
        assert_eq!(p.p50, 7.0);
    }

    #[test]
    fn profile_includes_target_column() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let set = FeatureSet {
            feature_names: vec!["temp".into()],
            target_name: "target_temp_2step".into(),
            rows: vec![
                FeatureVector {
                    timestamp: ts,
                    values: vec![10.0],
                    target: 12.0,
                },
                FeatureVector {
                    timestamp: ts + chrono::Duration::hours(3),
                    values: vec![20.0],
                    target: 14.0,
                },
            ],
        };
        let profile = DatasetProfile::from_feature_set(&set);
        assert_eq!(profile.rows, 2);
        assert_eq!(profile.columns, 2);
        assert_approx(profile.column("temp").unwrap().mean, 15.0, DEFAULT_EPSILON);
        assert_approx(
            profile.column("target_temp_2step").unwrap().max,
            14.0,
            DEFAULT_EPSILON,
        );
    }
}
