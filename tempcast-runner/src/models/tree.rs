//! CART regression tree (variance reduction).
//!
//! Also the base learner for the random forest and gradient boosting.
//! Splits are `x[feature] <= threshold` with midpoint thresholds between
//! consecutive distinct sorted values.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{check_columns, check_training_shape, FitError, Regressor};

/// Node impurity at or below this is treated as pure.
const PURE_IMPURITY: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.leaf_count() + right.leaf_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled per split; `None` considers every feature.
    pub max_features: Option<usize>,
    n_features: usize,
    root: Option<TreeNode>,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity: (SSE_left + SSE_right) / n.
    child_impurity: f64,
    left_impurity: f64,
    right_impurity: f64,
}

impl RegressionTree {
    pub fn new(max_depth: Option<usize>, min_samples_split: usize, min_samples_leaf: usize) -> Self {
        Self {
            max_depth,
            min_samples_split,
            min_samples_leaf,
            max_features: None,
            n_features: 0,
            root: None,
            importances: Vec::new(),
        }
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Raw (unnormalized) impurity decrease per feature.
    pub(crate) fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Fit on the rows named by `indices` (repeats allowed, as in a bootstrap).
    pub(crate) fn fit_indices(
        &mut self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
        rng: &mut StdRng,
    ) -> Result<(), FitError> {
        if indices.is_empty() {
            return Err(FitError::EmptyTrainingSet);
        }
        self.n_features = x.ncols();
        let mut idx = indices.to_vec();
        let mut importances = vec![0.0; x.ncols()];
        let root = self.build(x, y, &mut idx, 0, rng, &mut importances);
        self.importances = importances;
        self.root = Some(root);
        Ok(())
    }

    pub(crate) fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64, FitError> {
        self.root
            .as_ref()
            .map(|r| r.predict_row(row))
            .ok_or(FitError::NotFitted)
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        idx: &mut [usize],
        depth: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n = idx.len();
        let (mean, impurity) = mean_and_mse(y, idx);
        let leaf = TreeNode::Leaf {
            value: mean,
            n_samples: n,
        };

        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if n < self.min_samples_split || n < 2 * self.min_samples_leaf || depth_reached || impurity <= PURE_IMPURITY {
            return leaf;
        }

        let Some(split) = self.best_split(x, y, idx, impurity, rng) else {
            return leaf;
        };

        let n_left = partition_in_place(idx, |i| x[[i, split.feature]] <= split.threshold);
        if n_left == 0 || n_left == n {
            // midpoint rounded onto a neighbouring value
            return leaf;
        }
        let n_right = n - n_left;
        importances[split.feature] += n as f64 * impurity
            - (n_left as f64 * split.left_impurity + n_right as f64 * split.right_impurity);

        let (left_idx, right_idx) = idx.split_at_mut(n_left);
        let left = self.build(x, y, left_idx, depth + 1, rng, importances);
        let right = self.build(x, y, right_idx, depth + 1, rng, importances);

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(left),
            right: Box::new(right),
            n_samples: n,
            impurity,
        }
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        idx: &[usize],
        parent_impurity: f64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let p = x.ncols();
        let features: Vec<usize> = match self.max_features {
            Some(k) if k < p => {
                let mut f = index::sample(rng, p, k).into_vec();
                f.sort_unstable();
                f
            }
            _ => (0..p).collect(),
        };

        let per_feature: Vec<Option<SplitCandidate>> = features
            .into_par_iter()
            .map(|f| self.best_split_for_feature(x, y, idx, f))
            .collect();

        // Sequential reduction keeps ties deterministic (lowest feature wins).
        per_feature
            .into_iter()
            .flatten()
            .filter(|c| c.child_impurity < parent_impurity - PURE_IMPURITY)
            .fold(None, |best: Option<SplitCandidate>, c| match best {
                Some(b) if b.child_impurity <= c.child_impurity => Some(b),
                _ => Some(c),
            })
    }

    /// Sorted scan with running sums: O(n log n) per feature.
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        idx: &[usize],
        feature: usize,
    ) -> Option<SplitCandidate> {
        let n = idx.len();
        let mut pairs: Vec<(f64, f64)> = idx.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
        let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for i in 1..n {
            left_sum += pairs[i - 1].1;
            left_sq += pairs[i - 1].1 * pairs[i - 1].1;
            let n_left = i;
            let n_right = n - i;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }
            if pairs[i - 1].0 >= pairs[i].0 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse_left = (left_sq - left_sum * left_sum / n_left as f64).max(0.0);
            let sse_right = (right_sq - right_sum * right_sum / n_right as f64).max(0.0);
            let child = (sse_left + sse_right) / n as f64;

            if best.as_ref().map_or(true, |b| child < b.child_impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (pairs[i - 1].0 + pairs[i].0) / 2.0,
                    child_impurity: child,
                    left_impurity: sse_left / n_left as f64,
                    right_impurity: sse_right / n_right as f64,
                });
            }
        }
        best
    }
}

impl Regressor for RegressionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError> {
        check_training_shape(x, y)?;
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(0);
        self.fit_indices(x, y.view(), &indices, &mut rng)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FitError> {
        let root = self.root.as_ref().ok_or(FitError::NotFitted)?;
        check_columns(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|r| root.predict_row(r)).collect())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.root.as_ref()?;
        Some(normalize_importances(&self.importances))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn mean_and_mse(y: ArrayView1<f64>, idx: &[usize]) -> (f64, f64) {
    let n = idx.len() as f64;
    let mean = idx.iter().map(|&i| y[i]).sum::<f64>() / n;
    let mse = idx.iter().map(|&i| (y[i] - mean).powi(2)).sum::<f64>() / n;
    (mean, mse)
}

/// Stable-order partition: rows matching `pred` move to the front.
/// Returns how many matched.
fn partition_in_place(idx: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let (left, right): (Vec<usize>, Vec<usize>) = idx.iter().copied().partition(|&i| pred(i));
    let n_left = left.len();
    for (slot, i) in idx.iter_mut().zip(left.into_iter().chain(right)) {
        *slot = i;
    }
    n_left
}

/// Scale importances to sum to one; all-zero stays all-zero.
pub(crate) fn normalize_importances(raw: &[f64]) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; raw.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::step_problem;

    #[test]
    fn single_split_captures_a_step() {
        let (x, y) = step_problem(20);
        let mut tree = RegressionTree::new(Some(1), 2, 1);
        tree.fit(&x, &y).unwrap();

        match tree.root().unwrap() {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 9.5);
            }
            leaf => panic!("expected a split, got {leaf:?}"),
        }
        let preds = tree.predict(&x).unwrap();
        assert_eq!(preds, y);
    }

    #[test]
    fn importances_favour_the_informative_feature() {
        let (x, y) = step_problem(20);
        let mut tree = RegressionTree::new(None, 2, 1);
        tree.fit(&x, &y).unwrap();
        let imp = tree.feature_importances().unwrap();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(imp[0], 1.0);
    }

    #[test]
    fn max_depth_bounds_the_tree() {
        let x = Array2::from_shape_fn((64, 1), |(i, _)| i as f64);
        let y = (0..64).map(|i| (i as f64).sin()).collect::<Array1<f64>>();
        let mut tree = RegressionTree::new(Some(3), 2, 1);
        tree.fit(&x, &y).unwrap();
        assert!(tree.root().unwrap().depth() <= 3);
        assert!(tree.root().unwrap().leaf_count() <= 8);
    }

    #[test]
    fn min_samples_leaf_is_respected() {
        let (x, y) = step_problem(20);
        let mut tree = RegressionTree::new(None, 2, 12);
        tree.fit(&x, &y).unwrap();
        // 20 rows cannot be split into two leaves of at least 12.
        assert!(matches!(tree.root().unwrap(), TreeNode::Leaf { n_samples: 20, .. }));
    }

    #[test]
    fn constant_target_is_a_single_leaf() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i + j) as f64);
        let y = Array1::from_elem(10, 2.5);
        let mut tree = RegressionTree::new(None, 2, 1);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.root().unwrap().leaf_count(), 1);
        assert_eq!(tree.feature_importances().unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn predict_before_fit_fails() {
        let tree = RegressionTree::new(None, 2, 1);
        assert_eq!(tree.predict(&Array2::zeros((1, 2))), Err(FitError::NotFitted));
    }
}
