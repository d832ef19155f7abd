//! Property tests for training invariants.
//!
//! Uses proptest to verify:
//! 1. Metric ordering: 0 ≤ MAE ≤ RMSE, and R² never exceeds 1
//! 2. Tree bounds: a regression tree never predicts outside the target range
//! 3. Forest determinism: the same seed gives identical predictions
//! 4. Ridge shrinkage: a larger penalty never grows the standardized coefficient norm

use ndarray::{Array1, Array2, Axis};
use proptest::prelude::*;
use tempcast_runner::metrics::{mae, mean, r2, rmse};
use tempcast_runner::models::{
    DecisionTreeParams, FittedModel, RandomForestParams, Regressor, RidgeParams,
};
use tempcast_runner::ModelSpec;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Paired targets and predictions of equal length.
fn arb_pairs() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (2usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(-40.0..60.0_f64, n),
            prop::collection::vec(-40.0..60.0_f64, n),
        )
    })
}

/// A small two-feature regression problem.
fn arb_problem() -> impl Strategy<Value = (Array2<f64>, Array1<f64>)> {
    (12usize..40).prop_flat_map(|n| {
        (
            prop::collection::vec(-10.0..10.0_f64, n * 2),
            prop::collection::vec(-20.0..40.0_f64, n),
        )
            .prop_map(move |(xs, ys)| {
                let x = Array2::from_shape_vec((n, 2), xs).unwrap();
                (x, Array1::from(ys))
            })
    })
}

/// Coefficients rescaled to standardized features, where the penalty acts.
fn standardized_coefficients(model: &FittedModel, x: &Array2<f64>) -> Vec<f64> {
    let stds = x.std_axis(Axis(0), 0.0);
    match model {
        FittedModel::Linear(m) => m.coefficients.iter().zip(stds.iter()).map(|(c, s)| c * s).collect(),
        other => panic!("expected a linear model, got {other:?}"),
    }
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn mae_never_exceeds_rmse((y, pred) in arb_pairs()) {
        let m = mae(&y, &pred);
        let r = rmse(&y, &pred);
        prop_assert!(m >= 0.0);
        prop_assert!(m <= r + 1e-9, "mae {} > rmse {}", m, r);
    }

    #[test]
    fn r2_is_at_most_one((y, pred) in arb_pairs()) {
        let score = r2(&y, &pred, mean(&y));
        prop_assert!(score <= 1.0 + 1e-12);
    }

    #[test]
    fn tree_predictions_stay_within_target_range((x, y) in arb_problem()) {
        let spec = ModelSpec::DecisionTree(DecisionTreeParams { max_depth: Some(4), ..Default::default() });
        let model = spec.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let lo = y.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        for p in pred.iter() {
            prop_assert!(*p >= lo - 1e-9 && *p <= hi + 1e-9);
        }
    }

    #[test]
    fn forest_is_deterministic_for_a_seed((x, y) in arb_problem(), seed in 0u64..1000) {
        let spec = ModelSpec::RandomForest(RandomForestParams {
            n_estimators: 8,
            max_depth: Some(3),
            seed,
            ..Default::default()
        });
        let a = spec.fit(&x, &y).unwrap().predict(&x).unwrap();
        let b = spec.fit(&x, &y).unwrap().predict(&x).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn ridge_penalty_shrinks_coefficients((x, y) in arb_problem()) {
        let norm = |alpha: f64| {
            let model = ModelSpec::Ridge(RidgeParams { alpha }).fit(&x, &y).unwrap();
            standardized_coefficients(&model, &x).iter().map(|c| c * c).sum::<f64>().sqrt()
        };
        prop_assert!(norm(100.0) <= norm(0.1) + 1e-9);
    }
}
