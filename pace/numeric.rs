//! Small numeric helpers shared by the regressors and the selectors.
//!
//! Everything here is a pure function over `ndarray` views. Error metrics take a vector of
//! raw predictions (`X·W`) and the aligned targets, so callers decide which rows are scored.

use ndarray::{Array, ArrayBase, ArrayView1, Data, Dimension};

/// Dot product of two equal-length vectors.
///
/// Panics if the lengths differ.
pub fn inner_product(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "inner product requires equal lengths ({} vs {})",
        a.len(),
        b.len()
    );
    a.dot(&b)
}

/// The logistic function `1 / (1 + e^(-v))`.
#[inline]
pub fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Elementwise logistic function, preserving shape.
pub fn sigmoid_array<S, D>(values: &ArrayBase<S, D>) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    values.mapv(sigmoid)
}

/// Two vectors are equal when they have the same length and no component differs by more
/// than `tolerance`. A tolerance of zero is exact comparison.
pub fn approx_equal(a: ArrayView1<f64>, b: ArrayView1<f64>, tolerance: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    max_abs_difference(a, b) <= tolerance
}

/// Largest absolute componentwise difference. Both vectors must have the same length.
pub fn max_abs_difference(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0_f64, |acc, (&x, &y)| acc.max((x - y).abs()))
}

/// Compresses a boolean mask into the ascending list of positions that are set.
pub fn which(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &set)| set.then_some(i))
        .collect()
}

/// Hard classification of a raw score: class 1 iff the score is strictly positive.
#[inline]
pub fn hard_threshold(score: f64) -> f64 {
    if score > 0.0 { 1.0 } else { 0.0 }
}

/// Mean absolute residual. NaN for an empty set.
pub fn mean_absolute_error(predicted: ArrayView1<f64>, actual: ArrayView1<f64>) -> f64 {
    assert_eq!(predicted.len(), actual.len());
    let total: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(&p, &y)| (p - y).abs())
        .sum();
    total / predicted.len() as f64
}

/// Square root of the mean squared residual. NaN for an empty set.
pub fn root_mean_squared_error(predicted: ArrayView1<f64>, actual: ArrayView1<f64>) -> f64 {
    assert_eq!(predicted.len(), actual.len());
    let total: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(&p, &y)| (p - y).powi(2))
        .sum();
    (total / predicted.len() as f64).sqrt()
}

/// Fraction of rows whose hard-thresholded score disagrees with the 0/1 label.
/// NaN for an empty set.
pub fn zero_one_error(scores: ArrayView1<f64>, labels: ArrayView1<f64>) -> f64 {
    assert_eq!(scores.len(), labels.len());
    let wrong = scores
        .iter()
        .zip(labels.iter())
        .filter(|&(&s, &y)| hard_threshold(s) != y)
        .count();
    wrong as f64 / scores.len() as f64
}
