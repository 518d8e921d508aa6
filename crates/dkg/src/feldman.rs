//! Feldman verifiable secret sharing over the member polynomials.
//!
//! Each member holds `f(x) = a_0 + a_1*x + ... + a_{t-1}*x^{t-1}` and
//! publishes `C_j = a_j·G`. A share `s = f(i)` is valid iff
//! `s·G == Σ i^j·C_j`.

use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use zkvote_crypto::polynomial::{commit, evaluate_group, evaluate_scalar};
use zkvote_crypto::{Point, Scalar};
use zkvote_types::MemberId;

/// A member's secret polynomial. Coefficients are wiped on drop.
pub struct KeyGenPolynomial {
    coefficients: Vec<Scalar>,
}

impl KeyGenPolynomial {
    /// Random polynomial with `threshold` coefficients.
    pub fn generate<R: RngCore + CryptoRng>(threshold: u32, rng: &mut R) -> Self {
        let secret = Scalar::random(rng);
        Self::with_secret(secret, threshold, rng)
    }

    /// Random polynomial with a fixed constant term.
    pub fn with_secret<R: RngCore + CryptoRng>(secret: Scalar, threshold: u32, rng: &mut R) -> Self {
        let mut coefficients = Vec::with_capacity(threshold as usize);
        coefficients.push(secret);
        for _ in 1..threshold {
            coefficients.push(Scalar::random(rng));
        }
        Self { coefficients }
    }

    pub fn threshold(&self) -> u32 {
        self.coefficients.len() as u32
    }

    /// `a_0`, which doubles as the member's round-2 decryption key.
    pub fn secret(&self) -> &Scalar {
        &self.coefficients[0]
    }

    pub fn evaluate(&self, x: MemberId) -> Scalar {
        evaluate_scalar(&self.coefficients, &Scalar::from(x as u64))
    }

    pub fn commitments(&self) -> Vec<Point> {
        commit(&self.coefficients)
    }
}

impl Drop for KeyGenPolynomial {
    fn drop(&mut self) {
        self.coefficients.zeroize();
    }
}

/// Check `share·G == Σ recipient^j·C_j`.
pub fn verify_share(share: &Scalar, recipient: MemberId, commitments: &[Point]) -> bool {
    Point::from_scalar(share) == evaluate_group(commitments, &Scalar::from(recipient as u64))
}

/// Expected public share of `member_id` under aggregate commitments.
pub fn expected_public_share(aggregate: &[Point], member_id: MemberId) -> Point {
    evaluate_group(aggregate, &Scalar::from(member_id as u64))
}

/// Coefficient-wise sum of commitment vectors. Vectors must share a length.
pub fn aggregate_commitments(vectors: &[Vec<Point>]) -> Option<Vec<Point>> {
    let len = vectors.first()?.len();
    if vectors.iter().any(|v| v.len() != len) {
        return None;
    }
    Some(
        (0..len)
            .map(|j| vectors.iter().map(|v| v[j]).sum())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use zkvote_crypto::lagrange_coefficient;

    #[test]
    fn test_share_verification() {
        let poly = KeyGenPolynomial::generate(3, &mut OsRng);
        let commitments = poly.commitments();
        assert_eq!(commitments.len(), 3);
        for i in 1..=5 {
            assert!(verify_share(&poly.evaluate(i), i, &commitments));
        }
        assert!(!verify_share(&poly.evaluate(1), 2, &commitments));
    }

    #[test]
    fn test_fixed_secret() {
        let secret = Scalar::from(42u64);
        let poly = KeyGenPolynomial::with_secret(secret, 2, &mut OsRng);
        assert_eq!(*poly.secret(), secret);
        assert_eq!(poly.evaluate(0), secret);
        assert_eq!(poly.commitments()[0], Point::from_scalar(&secret));
    }

    #[test]
    fn test_aggregate_shares_interpolate_to_joint_secret() {
        let polys: Vec<_> = (0..3).map(|_| KeyGenPolynomial::generate(2, &mut OsRng)).collect();
        let aggregate =
            aggregate_commitments(&polys.iter().map(|p| p.commitments()).collect::<Vec<_>>())
                .unwrap();

        let sk = |i: MemberId| -> Scalar { polys.iter().map(|p| p.evaluate(i)).sum() };
        for i in 1..=3 {
            assert_eq!(Point::from_scalar(&sk(i)), expected_public_share(&aggregate, i));
        }

        let indices = [1u32, 3];
        let joint: Scalar = indices
            .iter()
            .map(|&i| sk(i) * lagrange_coefficient(i, &indices).unwrap())
            .sum();
        assert_eq!(Point::from_scalar(&joint), aggregate[0]);
    }

    #[test]
    fn test_aggregate_rejects_ragged() {
        let a = KeyGenPolynomial::generate(2, &mut OsRng).commitments();
        let b = KeyGenPolynomial::generate(3, &mut OsRng).commitments();
        assert!(aggregate_commitments(&[a, b]).is_none());
        assert!(aggregate_commitments(&[]).is_none());
    }
}
