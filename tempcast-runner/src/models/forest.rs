//! Bagged regression trees.
//!
//! Tree `t` draws its bootstrap sample from `StdRng::seed_from_u64(seed + t)`,
//! so a forest is reproducible regardless of how rayon schedules the trees.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{normalize_importances, RegressionTree};
use super::{check_columns, check_training_shape, FitError, RandomForestParams, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: RandomForestParams,
    trees: Vec<RegressionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            n_features: 0,
            importances: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError> {
        check_training_shape(x, y)?;
        let n = x.nrows();
        let p = &self.params;

        let trees = (0..p.n_estimators)
            .into_par_iter()
            .map(|t| -> Result<RegressionTree, FitError> {
                let mut rng = StdRng::seed_from_u64(p.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut tree = RegressionTree::new(p.max_depth, p.min_samples_split, p.min_samples_leaf)
                    .with_max_features(p.max_features);
                tree.fit_indices(x, y.view(), &sample, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>, FitError>>()?;

        let mut raw = vec![0.0; x.ncols()];
        for tree in &trees {
            for (acc, v) in raw.iter_mut().zip(normalize_importances(tree.raw_importances())) {
                *acc += v;
            }
        }
        debug!(trees = trees.len(), rows = n, "random forest fitted");

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
        let mut sum = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x)?;
        }
        Ok(sum / self.trees.len() as f64)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        if self.trees.is_empty() {
            None
        } else {
            Some(self.importances.clone())
        }
    }
}
