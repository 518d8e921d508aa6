//! Threshold combination of partial decryptions.
//!
//! After DKG every member `i` holds `sk_i = f(i)` for the joint polynomial
//! `f` with `f(0) = sk`. For an aggregate ciphertext `(R, M)` member `i`
//! publishes `D_i = sk_i·R`.
//!
//! # Combination
//!
//! Given any `t` contributions:
//!
//! `sk·R = Σ λ_i · D_i`
//!
//! where `λ_i` are Lagrange coefficients at zero. Then `M - sk·R = w·G`, and
//! the tally `w` is recovered by a bounded discrete-log search.

use std::collections::HashSet;

use crate::curve::{Point, Scalar};
use crate::error::CryptoError;

/// Compute the Lagrange coefficient at zero for index `i` given all indices.
///
/// λ_i = Π_{j≠i} (x_j / (x_j - x_i))
pub fn lagrange_coefficient(i: u32, indices: &[u32]) -> Result<Scalar, CryptoError> {
    let i_scalar = Scalar::from_u64(i as u64);
    let mut numerator = Scalar::one();
    let mut denominator = Scalar::one();

    for &j in indices {
        if j == i {
            continue;
        }

        let j_scalar = Scalar::from_u64(j as u64);
        numerator = numerator * j_scalar;

        let diff = j_scalar - i_scalar;
        if diff.is_zero() {
            return Err(CryptoError::LagrangeInterpolationFailed);
        }
        denominator = denominator * diff;
    }

    let denom_inv = denominator
        .inverse()
        .ok_or(CryptoError::LagrangeInterpolationFailed)?;
    Ok(numerator * denom_inv)
}

fn check_indices(indices: &[u32], threshold: usize) -> Result<(), CryptoError> {
    if indices.len() < threshold {
        return Err(CryptoError::InsufficientShares {
            required: threshold,
            got: indices.len(),
        });
    }
    let unique: HashSet<u32> = indices.iter().copied().collect();
    if unique.len() != indices.len() {
        return Err(CryptoError::DuplicateShareIndex);
    }
    if indices.contains(&0) {
        return Err(CryptoError::LagrangeInterpolationFailed);
    }
    Ok(())
}

/// Interpolate scalar shares `(i, f(i))` at zero.
pub fn combine_scalar_shares(shares: &[(u32, Scalar)], threshold: usize) -> Result<Scalar, CryptoError> {
    let indices: Vec<u32> = shares.iter().map(|(idx, _)| *idx).collect();
    check_indices(&indices, threshold)?;

    let mut result = Scalar::zero();
    for (idx, share) in shares {
        result += *share * lagrange_coefficient(*idx, &indices)?;
    }
    Ok(result)
}

/// Combine partial decryptions `(i, sk_i·R)` into `sk·R`.
pub fn combine_partial_decryptions(
    shares: &[(u32, Point)],
    threshold: usize,
) -> Result<Point, CryptoError> {
    let indices: Vec<u32> = shares.iter().map(|(idx, _)| *idx).collect();
    check_indices(&indices, threshold)?;

    let mut result = Point::identity();
    for (idx, d) in shares {
        result += d.scalar_mul(&lagrange_coefficient(*idx, &indices)?);
    }
    Ok(result)
}

/// Find `w <= max` with `w·G == target`.
pub fn recover_discrete_log(target: &Point, max: u64) -> Result<u64, CryptoError> {
    let g = Point::generator();
    let mut acc = Point::identity();
    for w in 0..=max {
        if acc == *target {
            return Ok(w);
        }
        acc += g;
    }
    Err(CryptoError::DiscreteLogNotFound(max))
}
