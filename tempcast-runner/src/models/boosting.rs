//! Least-squares gradient boosting over shallow regression trees.
//!
//! Starts from the training mean; each stage fits a tree to the current
//! residuals (optionally on a row subsample) and adds `learning_rate` times
//! its prediction.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{normalize_importances, RegressionTree};
use super::{check_columns, check_training_shape, FitError, GradientBoostingParams, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub params: GradientBoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
            importances: Vec::new(),
        }
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError> {
        check_training_shape(x, y)?;
        let n = x.nrows();
        let p = self.params.clone();
        let mut rng = StdRng::seed_from_u64(p.seed);
        let sample_size = ((n as f64 * p.subsample).ceil() as usize).clamp(1, n);

        let init = y.sum() / n as f64;
        let mut pred = Array1::from_elem(n, init);
        let mut trees = Vec::with_capacity(p.n_estimators);
        let mut raw = vec![0.0; x.ncols()];

        for _ in 0..p.n_estimators {
            let residual = y - &pred;
            let indices: Vec<usize> = if sample_size < n {
                let mut s = index::sample(&mut rng, n, sample_size).into_vec();
                s.sort_unstable();
                s
            } else {
                (0..n).collect()
            };

            let mut tree = RegressionTree::new(Some(p.max_depth), p.min_samples_split, p.min_samples_leaf);
            tree.fit_indices(x, residual.view(), &indices, &mut rng)?;
            for (i, row) in x.rows().into_iter().enumerate() {
                pred[i] += p.learning_rate * tree.predict_row(row)?;
            }
            for (acc, v) in raw.iter_mut().zip(tree.raw_importances()) {
                *acc += v;
            }
            trees.push(tree);
        }
        debug!(stages = trees.len(), rows = n, "gradient boosting fitted");

        self.init = init;
        self.importances = normalize_importances(&raw);
        self.n_features = x.ncols();
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FitError> {
        if self.trees.is_empty() {
            return Err(FitError::NotFitted);
        }
        check_columns(self.n_features, x)?;
        let mut pred = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.trees {
            pred.scaled_add(self.params.learning_rate, &tree.predict(x)?);
        }
        Ok(pred)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        if self.trees.is_empty() {
            None
        } else {
            Some(self.importances.clone())
        }
    }
}
