//! Polynomial evaluation over scalars and over curve points.
//!
//! Both evaluators use Horner's method with the same recurrence, so for
//! `C_j = a_j·G` the identity
//!
//! `from_scalar(evaluate_scalar(a, x)) == evaluate_group(C, x)`
//!
//! holds for every `x`. This is the Feldman check used throughout the DKG.

use num_bigint::BigUint;

use crate::curve::{Point, Scalar};

/// Evaluate `f(x) = a_0 + a_1*x + ...` modulo the group order.
pub fn evaluate_scalar(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    let mut result = Scalar::zero();
    for coeff in coefficients.iter().rev() {
        result = result * *x + *coeff;
    }
    result
}

/// Evaluate a polynomial with integer coefficients modulo an arbitrary modulus.
///
/// Returns `None` for a zero modulus.
pub fn evaluate_mod(coefficients: &[BigUint], x: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    if *modulus == BigUint::from(0u32) {
        return None;
    }
    let mut result = BigUint::from(0u32);
    for coeff in coefficients.iter().rev() {
        result = (result * x + coeff) % modulus;
    }
    Some(result)
}

/// Evaluate a committed polynomial in the group: `Σ x^j·C_j`.
pub fn evaluate_group(commitments: &[Point], x: &Scalar) -> Point {
    let mut result = Point::identity();
    for commitment in commitments.iter().rev() {
        result = result.scalar_mul(x) + *commitment;
    }
    result
}

/// Commit to each coefficient: `C_j = a_j·G`.
pub fn commit(coefficients: &[Scalar]) -> Vec<Point> {
    coefficients.iter().map(Point::from_scalar).collect()
}
