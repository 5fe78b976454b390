//! Convenience wrappers around methods from the approx crate for comparing probabilities.

use approx::AbsDiffEq;

/// Tolerance used when checking that a probability row sums to one.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Returns true if every entry is a finite, non-negative probability and the entries sum to one
/// within [`ROW_SUM_TOLERANCE`].
#[must_use]
pub fn is_probability_row(row: &[f64]) -> bool {
    row.iter().all(|p| p.is_finite() && *p >= 0.0)
        && almost_eq(row.iter().sum(), 1.0, ROW_SUM_TOLERANCE)
}
