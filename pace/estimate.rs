//! # Weight Estimation
//!
//! The two fitters used inside the curriculum loops:
//!
//! 1.  **Closed form (normal equations):** `W = (XᵗX)⁻¹XᵗY`, optionally with a diagonal
//!     instance weighting `A`, giving `W = (XᵗAᵗAX)⁻¹XᵗAᵗAY`. The normal matrix is checked
//!     for conditioning before it is inverted, so a degenerate subset of rows surfaces as
//!     [`EstimationError::ModelIsIllConditioned`] instead of as garbage weights.
//!
//! 2.  **Gradient ascent (logistic likelihood):** starting from all-ones weights, a fixed
//!     number of steps `W ← W + α·Xᵗ(Y − σ(XW))`. There is no convergence test; the step
//!     count is the only stopping rule.

use crate::numeric::sigmoid_array;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Inverse, SVD};
use thiserror::Error;

/// Normal matrices worse than this are treated as singular.
pub const MAX_CONDITION_NUMBER: f64 = 1e12;

/// A comprehensive error type for fitting and for the regressors built on top of it.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("Cannot fit weights on an empty set of rows.")]
    EmptyInput,

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Instance weights must be finite and non-negative; found {value} at row {row}.")]
    InvalidInstanceWeight { row: usize, value: f64 },

    #[error(
        "The normal matrix is singular or ill-conditioned (condition number {condition_number:.3e}). The selected rows do not determine the weights."
    )]
    ModelIsIllConditioned { condition_number: f64 },

    #[error("Inverting the normal matrix failed: {0}")]
    InversionFailed(LinalgError),

    #[error("Singular value decomposition of the normal matrix failed: {0}")]
    ConditionEstimateFailed(LinalgError),

    #[error("The fit produced non-finite weights.")]
    NonFiniteWeights,

    #[error("No train/test split has been made. Split the dataset before training.")]
    MissingSplit,

    #[error("The model has not been trained yet.")]
    NotTrained,
}

/// Ratio of the largest to the smallest singular value. Infinite when the smallest
/// singular value vanishes relative to the largest.
pub fn calculate_condition_number(matrix: &Array2<f64>) -> Result<f64, LinalgError> {
    let (_, singular_values, _) = matrix.svd(false, false)?;

    let max_sv = singular_values.iter().fold(0.0_f64, |max, &v| max.max(v));
    let min_sv = singular_values
        .iter()
        .fold(f64::INFINITY, |min, &v| min.min(v));

    if max_sv == 0.0 || min_sv <= f64::EPSILON * max_sv {
        return Ok(f64::INFINITY);
    }
    Ok(max_sv / min_sv)
}

fn check_shapes(x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<(), EstimationError> {
    if x.nrows() != y.len() {
        return Err(EstimationError::DimensionMismatch(format!(
            "design matrix has {} rows but the target has {} entries",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(EstimationError::EmptyInput);
    }
    Ok(())
}

fn ensure_finite(weights: Array1<f64>) -> Result<Array1<f64>, EstimationError> {
    if weights.iter().all(|w| w.is_finite()) {
        Ok(weights)
    } else {
        log::error!("Non-finite weights after fitting: {:?}", weights);
        Err(EstimationError::NonFiniteWeights)
    }
}

/// Inverts `XᵗX` after checking that it is well conditioned.
///
/// Both the check and the inverse work on the equilibrated matrix `D·XᵗX·D` with
/// `D = diag(1/√(XᵗX)ᵢᵢ)`, so the units of a column never decide whether a fit is accepted.
/// The inverse is scaled back as `D·(D·XᵗX·D)⁻¹·D`.
fn invert_normal_matrix(gram: &Array2<f64>) -> Result<Array2<f64>, EstimationError> {
    let diagonal = gram.diag();
    if diagonal.iter().any(|&g| !(g.is_finite() && g > 0.0)) {
        // An all-zero column leaves the normal matrix singular.
        return Err(EstimationError::ModelIsIllConditioned {
            condition_number: f64::INFINITY,
        });
    }
    let scale = diagonal.mapv(|g| 1.0 / g.sqrt());
    let outer = Array2::from_shape_fn(gram.dim(), |(i, j)| scale[i] * scale[j]);
    let equilibrated = gram * &outer;

    let condition_number = calculate_condition_number(&equilibrated)
        .map_err(EstimationError::ConditionEstimateFailed)?;
    log::trace!(
        "Equilibrated normal matrix condition number: {:.3e}",
        condition_number
    );
    if !condition_number.is_finite() || condition_number > MAX_CONDITION_NUMBER {
        return Err(EstimationError::ModelIsIllConditioned { condition_number });
    }
    let inverse = equilibrated
        .inv()
        .map_err(EstimationError::InversionFailed)?;
    Ok(inverse * &outer)
}

/// Ordinary least squares through the normal equations.
pub fn fit_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<Array1<f64>, EstimationError> {
    check_shapes(&x, &y)?;
    let xt = x.t();
    let inverse = invert_normal_matrix(&xt.dot(&x))?;
    ensure_finite(inverse.dot(&xt.dot(&y)))
}

/// Least squares with a diagonal instance weighting `A = diag(a)`.
///
/// Rows are scaled by `a` before the closed-form solve, which yields
/// `(XᵗAᵗAX)⁻¹XᵗAᵗAY`; note that `a` enters squared.
pub fn fit_weighted_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    instance_weights: ArrayView1<f64>,
) -> Result<Array1<f64>, EstimationError> {
    check_shapes(&x, &y)?;
    if instance_weights.len() != x.nrows() {
        return Err(EstimationError::DimensionMismatch(format!(
            "{} instance weights for {} rows",
            instance_weights.len(),
            x.nrows()
        )));
    }
    if let Some((row, &value)) = instance_weights
        .iter()
        .enumerate()
        .find(|&(_, &a)| !(a.is_finite() && a >= 0.0))
    {
        return Err(EstimationError::InvalidInstanceWeight { row, value });
    }

    let scaled_y = &y * &instance_weights;
    let scaled_x = &x * &instance_weights.insert_axis(Axis(1));
    fit_least_squares(scaled_x.view(), scaled_y.view())
}

/// Batch gradient ascent on the logistic log-likelihood from all-ones weights.
pub fn fit_gradient_ascent(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    learning_rate: f64,
    cycles: usize,
) -> Result<Array1<f64>, EstimationError> {
    check_shapes(&x, &y)?;
    let mut weights = Array1::<f64>::ones(x.ncols());
    for _ in 0..cycles {
        let error = &y - &sigmoid_array(&x.dot(&weights));
        weights.scaled_add(learning_rate, &x.t().dot(&error));
    }
    ensure_finite(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_design(n: usize, p: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((n, p), |(_, j)| {
            if j == 0 {
                1.0
            } else {
                rng.r#gen::<f64>() * 4.0 - 2.0
            }
        })
    }

    #[test]
    fn exact_line_is_recovered() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![2.0, 5.0, 8.0, 11.0];
        let w = fit_least_squares(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(w[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(w[1], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn residual_is_orthogonal_to_every_column() {
        let x = random_design(50, 4, 11);
        let mut rng = StdRng::seed_from_u64(12);
        let y = Array1::from_shape_fn(50, |_| rng.r#gen::<f64>() * 10.0);
        let w = fit_least_squares(x.view(), y.view()).unwrap();
        assert_eq!(w.len(), 4);

        let residual = &y - &x.dot(&w);
        for column in x.columns() {
            assert_abs_diff_eq!(column.dot(&residual), 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn duplicated_column_is_ill_conditioned() {
        let x = array![[1.0, 2.0, 2.0], [1.0, 3.0, 3.0], [1.0, 5.0, 5.0], [1.0, 7.0, 7.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        match fit_least_squares(x.view(), y.view()) {
            Err(EstimationError::ModelIsIllConditioned { condition_number }) => {
                assert!(condition_number > MAX_CONDITION_NUMBER);
            }
            other => panic!("Expected ModelIsIllConditioned, got {:?}", other),
        }
    }

    #[test]
    fn large_feature_scale_still_fits() {
        // Raw XᵗX has a condition number near 1.3e12 here; equilibrated it is about 14.
        let x = Array2::from_shape_fn((100, 2), |(i, j)| {
            if j == 0 { 1.0 } else { i as f64 * 1e4 }
        });
        let y = x.column(1).mapv(|v| 3.0 + 2.0 * v);
        let w = fit_least_squares(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(w[1], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(w[0], 3.0, epsilon = 1e-4);

        let raw = x.t().dot(&x);
        assert!(calculate_condition_number(&raw).unwrap() > MAX_CONDITION_NUMBER);
    }

    #[test]
    fn zero_column_is_ill_conditioned() {
        let x = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0]];
        let y = array![1.0, 2.0, 3.0];
        match fit_least_squares(x.view(), y.view()) {
            Err(EstimationError::ModelIsIllConditioned { condition_number }) => {
                assert!(condition_number.is_infinite());
            }
            other => panic!("Expected ModelIsIllConditioned, got {:?}", other),
        }
    }

    #[test]
    fn fewer_rows_than_columns_is_ill_conditioned() {
        let x = array![[1.0, 0.5, 2.0]];
        let y = array![1.0];
        assert!(matches!(
            fit_least_squares(x.view(), y.view()),
            Err(EstimationError::ModelIsIllConditioned { .. })
        ));
    }

    #[test]
    fn empty_and_mismatched_inputs_are_rejected() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        assert!(matches!(
            fit_least_squares(x.view(), y.view()),
            Err(EstimationError::EmptyInput)
        ));

        let x = array![[1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0];
        assert!(matches!(
            fit_least_squares(x.view(), y.view()),
            Err(EstimationError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn unit_instance_weights_match_plain_fit() {
        let x = random_design(30, 3, 5);
        let y = x.column(1).mapv(|v| 1.0 + 0.5 * v) + x.column(2).mapv(|v| v * v);
        let plain = fit_least_squares(x.view(), y.view()).unwrap();
        let weighted =
            fit_weighted_least_squares(x.view(), y.view(), Array1::ones(30).view()).unwrap();
        for (a, b) in plain.iter().zip(weighted.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_instance_weight_ignores_outlier() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]];
        let y = array![1.0, 3.0, 5.0, 7.0, 100.0];
        let a = array![1.0, 1.0, 1.0, 1.0, 0.0];
        let w = fit_weighted_least_squares(x.view(), y.view(), a.view()).unwrap();
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(w[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn instance_weights_enter_squared() {
        // Two points at x = 0 with targets 0 and 3; weights 1 and 2 give squared weights
        // 1 and 4, so the intercept-only fit is (0·1 + 3·4) / 5.
        let x = array![[1.0], [1.0]];
        let y = array![0.0, 3.0];
        let a = array![1.0, 2.0];
        let w = fit_weighted_least_squares(x.view(), y.view(), a.view()).unwrap();
        assert_abs_diff_eq!(w[0], 12.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn negative_instance_weight_is_rejected() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let y = array![0.0, 1.0, 2.0];
        let a = array![1.0, -0.5, 1.0];
        assert!(matches!(
            fit_weighted_least_squares(x.view(), y.view(), a.view()),
            Err(EstimationError::InvalidInstanceWeight { row: 1, .. })
        ));
    }

    #[test]
    fn gradient_ascent_without_cycles_keeps_initial_weights() {
        let x = array![[1.0, 2.0], [1.0, -1.0]];
        let y = array![1.0, 0.0];
        let w = fit_gradient_ascent(x.view(), y.view(), 0.001, 0).unwrap();
        assert_eq!(w, array![1.0, 1.0]);
    }

    #[test]
    fn gradient_ascent_takes_the_documented_step() {
        let x = array![[1.0, 2.0], [1.0, -1.0]];
        let y = array![1.0, 0.0];
        let w = fit_gradient_ascent(x.view(), y.view(), 0.1, 1).unwrap();

        let s0 = crate::numeric::sigmoid(3.0);
        let s1 = crate::numeric::sigmoid(0.0);
        let e0 = 1.0 - s0;
        let e1 = 0.0 - s1;
        assert_abs_diff_eq!(w[0], 1.0 + 0.1 * (e0 + e1), epsilon = 1e-12);
        assert_abs_diff_eq!(w[1], 1.0 + 0.1 * (2.0 * e0 - e1), epsilon = 1e-12);
    }

    #[test]
    fn gradient_ascent_separates_simple_classes() {
        let n = 80;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                1.0
            } else {
                (i as f64 - 39.5) / 10.0
            }
        });
        let y = Array1::from_shape_fn(n, |i| if i >= 40 { 1.0 } else { 0.0 });
        let w = fit_gradient_ascent(x.view(), y.view(), 0.01, 2000).unwrap();
        let scores = x.dot(&w);
        let error = crate::numeric::zero_one_error(scores.view(), y.view());
        assert!(error < 0.05, "training error too high: {error}");
    }
}
