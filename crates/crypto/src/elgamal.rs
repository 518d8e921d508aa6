//! Additively homomorphic ElGamal over BabyJubJub.
//!
//! A value `w` under public key `PK` with randomness `r` is the pair
//! `(R, M) = (r·G, r·PK + w·G)`. Ciphertexts add component-wise, so the sum of
//! many ballots encrypts the sum of their values.

use std::ops::Add;

use crate::curve::{Point, Scalar};

/// An ElGamal ciphertext `(R, M)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Ciphertext {
    pub r: Point,
    pub m: Point,
}

impl Ciphertext {
    /// Encrypt `value` under `pk` using explicit randomness.
    pub fn encrypt(pk: &Point, value: &Scalar, randomness: &Scalar) -> Self {
        Self {
            r: Point::from_scalar(randomness),
            m: pk.scalar_mul(randomness) + Point::from_scalar(value),
        }
    }

    /// Encryption of zero with zero randomness; the neutral element for `+`.
    pub fn identity() -> Self {
        Self {
            r: Point::identity(),
            m: Point::identity(),
        }
    }

    /// Recover `value·G` using the full secret key.
    pub fn decrypt_to_point(&self, sk: &Scalar) -> Point {
        self.m - self.r.scalar_mul(sk)
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: Ciphertext) -> Ciphertext {
        Ciphertext {
            r: self.r + rhs.r,
            m: self.m + rhs.m,
        }
    }
}

/// A committee member's contribution `D = sk_i·R`.
pub fn partial_decrypt(secret_share: &Scalar, r: &Point) -> Point {
    r.scalar_mul(secret_share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_homomorphic_sum() {
        let mut rng = OsRng;
        let sk = Scalar::random(&mut rng);
        let pk = Point::from_scalar(&sk);

        let total = [3u64, 0, 5, 7]
            .iter()
            .map(|w| Ciphertext::encrypt(&pk, &Scalar::from_u64(*w), &Scalar::random(&mut rng)))
            .fold(Ciphertext::identity(), |acc, c| acc + c);

        assert_eq!(total.decrypt_to_point(&sk), Point::from_scalar(&Scalar::from_u64(15)));
    }

    #[test]
    fn test_partial_decrypt_matches_full_key() {
        let mut rng = OsRng;
        let sk = Scalar::random(&mut rng);
        let pk = Point::from_scalar(&sk);
        let ct = Ciphertext::encrypt(&pk, &Scalar::from_u64(9), &Scalar::random(&mut rng));

        let d = partial_decrypt(&sk, &ct.r);
        assert_eq!(ct.m - d, Point::from_scalar(&Scalar::from_u64(9)));
    }
}
