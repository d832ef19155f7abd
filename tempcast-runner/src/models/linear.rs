//! Linear least squares with optional L2 (ridge) or L1 (lasso) penalty.
//!
//! Features are standardized before solving, so penalties act on a common
//! scale. Zero-variance columns are excluded from the solve and get a zero
//! coefficient. The stored coefficients are mapped back to the raw scale,
//! so prediction is a plain `intercept + x·w`.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_columns, check_training_shape, FitError, Regressor};

/// Columns with a standard deviation below this are treated as constant.
const CONSTANT_COLUMN_STD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "penalty", rename_all = "snake_case")]
pub enum Penalty {
    None,
    L2 { alpha: f64 },
    L1 { alpha: f64, max_iter: usize, tol: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub penalty: Penalty,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    fitted: bool,
}

impl LinearModel {
    pub fn new(penalty: Penalty) -> Self {
        Self {
            penalty,
            coefficients: Vec::new(),
            intercept: 0.0,
            fitted: false,
        }
    }
}

impl Regressor for LinearModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), FitError> {
        check_training_shape(x, y)?;
        let n = x.nrows() as f64;
        let p = x.ncols();

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
        let stds = x.std_axis(Axis(0), 0.0);
        let active: Vec<usize> = (0..p).filter(|&j| stds[j] > CONSTANT_COLUMN_STD).collect();

        let y_mean = y.sum() / n;
        let yc = y.mapv(|v| v - y_mean);

        let z = Array2::from_shape_fn((x.nrows(), active.len()), |(i, k)| {
            let j = active[k];
            (x[[i, j]] - means[j]) / stds[j]
        });

        let w = match self.penalty {
            Penalty::None => solve_normal_equations(&z, &yc, 0.0)?,
            Penalty::L2 { alpha } => solve_normal_equations(&z, &yc, alpha)?,
            Penalty::L1 { alpha, max_iter, tol } => coordinate_descent(&z, &yc, alpha, max_iter, tol),
        };

        let mut coefficients = vec![0.0; p];
        for (k, &j) in active.iter().enumerate() {
            coefficients[j] = w[k] / stds[j];
        }
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(means.iter())
                .map(|(c, m)| c * m)
                .sum::<f64>();

        self.coefficients = coefficients;
        self.intercept = intercept;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, FitError> {
        if !self.fitted {
            return Err(FitError::NotFitted);
        }
        check_columns(self.coefficients.len(), x)?;
        let w = Array1::from(self.coefficients.clone());
        Ok(x.dot(&w) + self.intercept)
    }
}

// ── Solvers ──────────────────────────────────────────────────────────

/// Solve `(ZᵀZ + αI) w = Zᵀy`: Cholesky first, Gauss-Jordan as fallback.
fn solve_normal_equations(z: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>, FitError> {
    let p = z.ncols();
    if p == 0 {
        return Ok(Array1::zeros(0));
    }
    let mut xtx = z.t().dot(z);
    for i in 0..p {
        xtx[[i, i]] += alpha;
    }
    let xty = z.t().dot(y);

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Ok(w);
    }
    debug!("normal equations not positive definite, falling back to Gauss-Jordan");
    gauss_jordan_solve(&xtx, &xty).ok_or_else(|| {
        FitError::Singular(format!("{p} standardized columns are linearly dependent"))
    })
}

/// Cholesky solve for a symmetric matrix. Returns `None` when a pivot is not
/// clearly positive relative to the largest diagonal entry.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let max_diag = (0..n).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
    let tol = 1e-10 * max_diag.max(1.0);
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= tol {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    // Lᵀ x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    Some(x)
}

/// Gauss-Jordan elimination with partial pivoting. `None` if singular.
pub(crate) fn gauss_jordan_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| m[[r1, col]].abs().total_cmp(&m[[r2, col]].abs()))?;
        if m[[pivot, col]].abs() < 1e-10 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                m.swap([col, k], [pivot, k]);
            }
            rhs.swap(col, pivot);
        }
        let diag = m[[col, col]];
        for k in 0..n {
            m[[col, k]] /= diag;
        }
        rhs[col] /= diag;
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    Some(rhs)
}

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Cyclic coordinate descent for `(1/2n)‖y − Zw‖² + α‖w‖₁`.
fn coordinate_descent(z: &Array2<f64>, y: &Array1<f64>, alpha: f64, max_iter: usize, tol: f64) -> Array1<f64> {
    let (n, p) = z.dim();
    let lambda = alpha * n as f64;
    let col_norms: Vec<f64> = (0..p).map(|j| z.column(j).dot(&z.column(j))).collect();
    let mut w = Array1::<f64>::zeros(p);
    let mut residual = y.clone();

    for iter in 0..max_iter {
        let mut change = 0.0;
        for j in 0..p {
            if col_norms[j] < 1e-15 {
                continue;
            }
            let col = z.column(j);
            let old = w[j];
            let rho = col.dot(&residual) + col_norms[j] * old;
            let new = soft_threshold(rho, lambda) / col_norms[j];
            if new != old {
                residual.scaled_add(old - new, &col);
                w[j] = new;
                change += (new - old).abs();
            }
        }
        if change < tol {
            debug!(iterations = iter + 1, "lasso converged");
            return w;
        }
    }
    debug!(max_iter, "lasso reached the iteration limit");
    w
}
