//! Regression metrics: pure functions, targets and predictions in, scalar out.
//!
//! R² uses the training-target mean as its baseline for both partitions, so
//! a test R² below zero means "worse than predicting the training mean".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Train and test metrics for one fitted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub train_rmse: f64,
    pub train_mae: f64,
    pub train_r2: f64,
    pub test_rmse: f64,
    pub test_mae: f64,
    pub test_r2: f64,
}

impl RegressionMetrics {
    pub fn compute(y_train: &[f64], train_pred: &[f64], y_test: &[f64], test_pred: &[f64]) -> Self {
        let baseline = mean(y_train);
        Self {
            train_rmse: rmse(y_train, train_pred),
            train_mae: mae(y_train, train_pred),
            train_r2: r2(y_train, train_pred, baseline),
            test_rmse: rmse(y_test, test_pred),
            test_mae: mae(y_test, test_pred),
            test_r2: r2(y_test, test_pred, baseline),
        }
    }

    /// Flat name → value map in the shape the recorder logs.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            ("train_rmse", self.train_rmse),
            ("train_mae", self.train_mae),
            ("train_r2", self.train_r2),
            ("test_rmse", self.test_rmse),
            ("test_mae", self.test_mae),
            ("test_r2", self.test_r2),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Root mean squared error. 0.0 for empty input.
pub fn rmse(y: &[f64], pred: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let mse = y
        .iter()
        .zip(pred)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / y.len() as f64;
    mse.sqrt()
}

/// Mean absolute error. 0.0 for empty input.
pub fn mae(y: &[f64], pred: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    y.iter().zip(pred).map(|(a, b)| (a - b).abs()).sum::<f64>() / y.len() as f64
}

/// `1 − RSS/TSS` with TSS measured around `baseline`. 0.0 when TSS is zero.
pub fn r2(y: &[f64], pred: &[f64], baseline: f64) -> f64 {
    let tss: f64 = y.iter().map(|v| (v - baseline).powi(2)).sum();
    if tss == 0.0 {
        return 0.0;
    }
    let rss: f64 = y.iter().zip(pred).map(|(a, b)| (a - b).powi(2)).sum();
    1.0 - rss / tss
}
