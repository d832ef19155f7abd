//! Regression models behind a uniform fit/predict capability.
//!
//! `ModelSpec` is the closed, serializable set of candidate configurations
//! (what goes into `[[training.candidates]]`). Fitting a spec yields a
//! `FittedModel`, which is what gets recorded and persisted.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod tree;

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tempcast_core::FeatureVector;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use linear::{LinearModel, Penalty};
pub use tree::{RegressionTree, TreeNode};

/// Why a single candidate could not produce a usable model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("invalid hyperparameter '{name}': {reason}")]
    InvalidHyperparameter { name: String, reason: String },

    #[error("singular design matrix: {0}")]
    Singular(String),

    #[error("shape mismatch: expected {expected} columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("model has not been fitted")]
    NotFitted,

    #[error("non-finite prediction at row {row}")]
    NonFinitePrediction { row: usize },
}

/// Uniform capability every regressor implements.
pub trait Regressor: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FitError>;

    /// Normalized impurity-based importances, if the model has them.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

// ── Hyperparameters ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeParams {
    pub alpha: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LassoParams {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LassoParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iter: 1000,
            tol: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionTreeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each stage.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

// ── Model specification ──────────────────────────────────────────────

/// Candidate model configuration (serializable, closed set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear,
    Ridge(RidgeParams),
    Lasso(LassoParams),
    DecisionTree(DecisionTreeParams),
    RandomForest(RandomForestParams),
    GradientBoosting(GradientBoostingParams),
}

impl ModelSpec {
    /// Tag recorded as `model_type`.
    pub fn algorithm(&self) -> &'static str {
        match self {
            ModelSpec::Linear => "linear",
            ModelSpec::Ridge(_) => "ridge",
            ModelSpec::Lasso(_) => "lasso",
            ModelSpec::DecisionTree(_) => "decision_tree",
            ModelSpec::RandomForest(_) => "random_forest",
            ModelSpec::GradientBoosting(_) => "gradient_boosting",
        }
    }

    /// Hyperparameters as a flat map, without the algorithm tag.
    pub fn params(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter(|(k, _)| k != "algorithm")
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        match self {
            ModelSpec::Linear => Ok(()),
            ModelSpec::Ridge(p) => non_negative("alpha", p.alpha),
            ModelSpec::Lasso(p) => {
                non_negative("alpha", p.alpha)?;
                at_least("max_iter", p.max_iter, 1)?;
                positive("tol", p.tol)
            }
            ModelSpec::DecisionTree(p) => {
                tree_limits(p.max_depth, p.min_samples_split, p.min_samples_leaf)
            }
            ModelSpec::RandomForest(p) => {
                at_least("n_estimators", p.n_estimators, 1)?;
                if let Some(k) = p.max_features {
                    at_least("max_features", k, 1)?;
                }
                tree_limits(p.max_depth, p.min_samples_split, p.min_samples_leaf)
            }
            ModelSpec::GradientBoosting(p) => {
                at_least("n_estimators", p.n_estimators, 1)?;
                positive("learning_rate", p.learning_rate)?;
                if !(p.subsample > 0.0 && p.subsample <= 1.0) {
                    return Err(invalid("subsample", format!("must be in (0, 1], got {}", p.subsample)));
                }
                tree_limits(Some(p.max_depth), p.min_samples_split, p.min_samples_leaf)
            }
        }
    }

    /// Validate, then fit a fresh model of this kind.
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedModel, FitError> {
        self.validate()?;
        let mut model = match self {
            ModelSpec::Linear => FittedModel::Linear(LinearModel::new(Penalty::None)),
            ModelSpec::Ridge(p) => FittedModel::Linear(LinearModel::new(Penalty::L2 { alpha: p.alpha })),
            ModelSpec::Lasso(p) => FittedModel::Linear(LinearModel::new(Penalty::L1 {
                alpha: p.alpha,
                max_iter: p.max_iter,
                tol: p.tol,
            })),
            ModelSpec::DecisionTree(p) => FittedModel::Tree(RegressionTree::new(
                p.max_depth,
                p.min_samples_split,
                p.min_samples_leaf,
            )),
            ModelSpec::RandomForest(p) => FittedModel::Forest(RandomForest::new(p.clone())),
            ModelSpec::GradientBoosting(p) => {
                FittedModel::Boosting(GradientBoosting::new(p.clone()))
            }
        };
        model.fit(x, y)?;
        Ok(model)
    }
}

fn invalid(name: &str, reason: String) -> FitError {
    FitError::InvalidHyperparameter {
        name: name.into(),
        reason,
    }
}

fn non_negative(name: &str, v: f64) -> Result<(), FitError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a finite value >= 0, got {v}")))
    }
}

fn positive(name: &str, v: f64) -> Result<(), FitError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a finite value > 0, got {v}")))
    }
}

fn at_least(name: &str, v: usize, min: usize) -> Result<(), FitError> {
    if v >= min {
        Ok(())
    } else {
        Err(invalid(name, format!("must be >= {min}, got {v}")))
    }
}

fn tree_limits(
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
) -> Result<(), FitError> {
    if let Some(d) = max_depth {
        at_least("max_depth", d, 1)?;
    }
    at_least("min_samples_split", min_samples_split, 2)?;
    at_least("min_samples_leaf", min_samples_leaf, 1)
}

// ── Fitted models ────────────────────────────────────────────────────

/// A trained model, serializable as the run's `model.json` artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(LinearModel),
    Tree(RegressionTree),
    Forest(RandomForest),
    Boosting(GradientBoosting),
}

impl FittedModel {
    fn inner(&self) -> &dyn Regressor {
        match self {
            FittedModel::Linear(m) => m,
            FittedModel::Tree(m) => m,
            FittedModel::Forest(m) => m,
            FittedModel::Boosting(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            FittedModel::Linear(m) => m,
            FittedModel::Tree(m) => m,
            FittedModel::Forest(m) => m,
            FittedModel::Boosting(m) => m,
        }
    }
}

impl Regressor for FittedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError> {
        self.inner_mut().fit(x, y)
    }

    /// Predictions are checked for finiteness here so every model kind
    /// reports the same error.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FitError> {
        let preds = self.inner().predict(x)?;
        if let Some(row) = preds.iter().position(|p| !p.is_finite()) {
            return Err(FitError::NonFinitePrediction { row });
        }
        Ok(preds)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.inner().feature_importances()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Shared checks for `fit(x, y)`.
pub(crate) fn check_training_shape(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError> {
    if x.nrows() == 0 {
        return Err(FitError::EmptyTrainingSet);
    }
    if y.len() != x.nrows() {
        return Err(FitError::ShapeMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_columns(expected: usize, x: &Array2<f64>) -> Result<(), FitError> {
    if x.ncols() != expected {
        return Err(FitError::ShapeMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// Feature matrix and target vector from partition rows.
pub fn design_matrix(rows: &[FeatureVector], n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((rows.len(), n_features), |(i, j)| rows[i].values[j]);
    let y = rows.iter().map(|r| r.target).collect::<Array1<f64>>();
    (x, y)
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::{Array1, Array2};

    /// y = 3·x0 − 2·x1 + 5 over a small deterministic grid.
    pub fn linear_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7) % 5) as f64
            }
        });
        let y = x
            .rows()
            .into_iter()
            .map(|r| 3.0 * r[0] - 2.0 * r[1] + 5.0)
            .collect();
        (x, y)
    }

    /// Step function of x0: 1.0 below 10, 4.0 from 10 on.
    pub fn step_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = (0..n).map(|i| if i < 10 { 1.0 } else { 4.0 }).collect();
        (x, y)
    }
}
