//! Chronological train/test partitioning.
//!
//! The first `ceil(n * (1 - test_fraction))` rows train, the rest evaluate.
//! Rows are never shuffled, so every test timestamp is later than every
//! training timestamp.

use crate::features::{FeatureSet, FeatureVector};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq)]
pub enum PartitionError {
    #[error("test fraction must be within (0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("cannot partition {total} rows: train {train}, test {test} (both must be non-empty)")]
    InsufficientSamples {
        total: usize,
        train: usize,
        test: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub test_fraction: f64,
    pub train: Vec<FeatureVector>,
    pub test: Vec<FeatureVector>,
}

impl Partition {
    /// Index of the first test row in the original feature set.
    pub fn boundary(&self) -> usize {
        self.train.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn last_train_timestamp(&self) -> Option<NaiveDateTime> {
        self.train.last().map(|r| r.timestamp)
    }

    pub fn first_test_timestamp(&self) -> Option<NaiveDateTime> {
        self.test.first().map(|r| r.timestamp)
    }
}

/// Number of training rows for `n` rows and `test_fraction`.
///
/// The epsilon keeps float noise in `n * (1 - f)` from rounding up an
/// extra row.
pub fn train_size(n: usize, test_fraction: f64) -> usize {
    let raw = n as f64 * (1.0 - test_fraction);
    ((raw - 1e-9).ceil().max(0.0) as usize).min(n)
}

/// Split a time-ordered feature set.
pub fn partition(set: &FeatureSet, test_fraction: f64) -> Result<Partition, PartitionError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PartitionError::InvalidFraction(test_fraction));
    }

    let total = set.len();
    let train = train_size(total, test_fraction);
    let test = total - train;
    if train == 0 || test == 0 {
        return Err(PartitionError::InsufficientSamples { total, train, test });
    }

    let (train_rows, test_rows) = set.rows.split_at(train);
    info!(total, train, test, test_fraction, "partitioned feature set");

    Ok(Partition {
        feature_names: set.feature_names.clone(),
        target_name: set.target_name.clone(),
        test_fraction,
        train: train_rows.to_vec(),
        test: test_rows.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn set(n: usize) -> FeatureSet {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        FeatureSet {
            feature_names: vec!["temp".into()],
            target_name: "target_temp_2step".into(),
            rows: (0..n)
                .map(|i| FeatureVector {
                    timestamp: start + Duration::hours(3 * i as i64),
                    values: vec![i as f64],
                    target: i as f64 + 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn forty_five_rows_split_36_9() {
        let p = partition(&set(45), 0.2).unwrap();
        assert_eq!(p.train.len(), 36);
        assert_eq!(p.test.len(), 9);
        assert_eq!(p.boundary(), 36);
        assert_eq!(p.test[0].values[0], 36.0);
    }

    #[test]
    fn split_rounds_train_up() {
        assert_eq!(train_size(10, 0.25), 8); // 7.5 -> 8
        assert_eq!(train_size(7, 0.2), 6); // 5.6 -> 6
        assert_eq!(train_size(50, 0.2), 40);
    }

    #[test]
    fn test_rows_come_strictly_after_train_rows() {
        let p = partition(&set(20), 0.3).unwrap();
        assert!(p.last_train_timestamp().unwrap() < p.first_test_timestamp().unwrap());
    }

    #[test]
    fn invalid_fraction_is_rejected() {
        for f in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                partition(&set(10), f),
                Err(PartitionError::InvalidFraction(_))
            ));
        }
    }

    #[test]
    fn single_row_cannot_be_split() {
        assert_eq!(
            partition(&set(1), 0.2),
            Err(PartitionError::InsufficientSamples {
                total: 1,
                train: 1,
                test: 0
            })
        );
    }
}
