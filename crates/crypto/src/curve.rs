//! BabyJubJub group arithmetic and ledger encoding.
//!
//! Points live in the prime-order subgroup generated by `Base8`. Scalars are
//! integers modulo the subgroup order `r`. Coordinates are elements of the
//! BN254 scalar field, which is also the native field of the proof circuits.

use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use ark_babyjubjub::{EdwardsAffine, Fq, Fr};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, Field, One, PrimeField, UniformRand, Zero};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use zkvote_types::{EncodedPoint, FieldElement};

use crate::error::CryptoError;

/// Coordinate field of the curve (the BN254 scalar field).
pub type BaseField = Fq;

/// Scalar field of the prime-order subgroup.
pub type ScalarField = Fr;

/// Decimal value of the BN254 scalar field modulus.
pub const BN_SCALAR_FIELD_MOD: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

fn to_biguint<F: PrimeField>(value: &F) -> BigUint {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le())
}

/// Modulus of a prime field as an integer.
pub fn field_modulus<F: PrimeField>() -> BigUint {
    BigUint::from_bytes_le(&F::MODULUS.to_bytes_le())
}

/// Order `r` of the prime-order subgroup.
pub fn group_order() -> BigUint {
    field_modulus::<ScalarField>()
}

/// Encode a field element as a decimal string.
pub fn encode_field<F: PrimeField>(value: &F) -> FieldElement {
    FieldElement(to_biguint(value).to_string())
}

/// Decode a decimal string into a field element.
///
/// Rejects anything that is not a canonical decimal integer below the modulus.
pub fn decode_field<F: PrimeField>(value: &FieldElement) -> Result<F, CryptoError> {
    let s = value.as_str();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::InvalidFieldElement(s.to_string()));
    }
    let n: BigUint = s
        .parse()
        .map_err(|_| CryptoError::InvalidFieldElement(s.to_string()))?;
    if n >= field_modulus::<F>() {
        return Err(CryptoError::FieldElementOutOfRange(s.to_string()));
    }
    Ok(F::from_le_bytes_mod_order(&n.to_bytes_le()))
}

// =========================
// SCALAR
// =========================

/// Integer modulo the group order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Zeroize)]
pub struct Scalar(ScalarField);

impl Scalar {
    pub fn zero() -> Self {
        Self(ScalarField::zero())
    }

    pub fn one() -> Self {
        Self(ScalarField::one())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(ScalarField::from(value))
    }

    pub fn from_field(value: ScalarField) -> Self {
        Self(value)
    }

    /// Uniformly random scalar drawn from the caller's CSPRNG.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(ScalarField::rand(rng))
    }

    /// Interpret big-endian bytes as an integer and reduce it mod `r`.
    pub fn from_be_bytes_mod_order(bytes: &[u8]) -> Self {
        Self(ScalarField::from_be_bytes_mod_order(bytes))
    }

    /// Reduce an integer mod `r`.
    pub fn from_biguint(value: &BigUint) -> Self {
        Self(ScalarField::from_le_bytes_mod_order(&value.to_bytes_le()))
    }

    /// Reduce a base-field element mod `r`.
    pub fn from_base_field(value: &BaseField) -> Self {
        Self(ScalarField::from_le_bytes_mod_order(
            &value.into_bigint().to_bytes_le(),
        ))
    }

    /// The same integer as an element of the base field (`r < p`).
    pub fn to_base_field(&self) -> BaseField {
        BaseField::from_le_bytes_mod_order(&self.0.into_bigint().to_bytes_le())
    }

    pub fn to_biguint(&self) -> BigUint {
        to_biguint(&self.0)
    }

    pub fn inner(&self) -> &ScalarField {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn inverse(&self) -> Option<Self> {
        self.0.inverse().map(Self)
    }

    pub fn encode(&self) -> FieldElement {
        encode_field(&self.0)
    }

    /// Decode a scalar, rejecting values `>= r`.
    pub fn decode(value: &FieldElement) -> Result<Self, CryptoError> {
        decode_field::<ScalarField>(value).map(Self)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl Add for Scalar {
    type Output = Scalar;

    fn add(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 + rhs.0)
    }
}

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Scalar) {
        self.0 += rhs.0;
    }
}

impl Sub for Scalar {
    type Output = Scalar;

    fn sub(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 - rhs.0)
    }
}

impl Mul for Scalar {
    type Output = Scalar;

    fn mul(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 * rhs.0)
    }
}

impl Neg for Scalar {
    type Output = Scalar;

    fn neg(self) -> Scalar {
        Scalar(-self.0)
    }
}

impl Sum for Scalar {
    fn sum<I: Iterator<Item = Scalar>>(iter: I) -> Scalar {
        iter.fold(Scalar::zero(), |acc, s| acc + s)
    }
}

// =========================
// POINT
// =========================

/// A point of the prime-order subgroup.
///
/// Only constructed by group operations or by [`Point::decode`], which checks
/// curve and subgroup membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point(EdwardsAffine);

impl Point {
    pub fn generator() -> Self {
        Self(EdwardsAffine::generator())
    }

    /// The additive identity `(0, 1)`.
    pub fn identity() -> Self {
        Self(EdwardsAffine::zero())
    }

    /// `k·G`
    pub fn from_scalar(k: &Scalar) -> Self {
        Self((EdwardsAffine::generator() * k.0).into_affine())
    }

    /// `k·P`
    pub fn scalar_mul(&self, k: &Scalar) -> Self {
        Self((self.0 * k.0).into_affine())
    }

    pub fn x(&self) -> BaseField {
        self.0.x
    }

    pub fn y(&self) -> BaseField {
        self.0.y
    }

    pub fn is_identity(&self) -> bool {
        self.0.is_zero()
    }

    pub fn inner(&self) -> &EdwardsAffine {
        &self.0
    }

    pub fn encode(&self) -> EncodedPoint {
        EncodedPoint::new(encode_field(&self.0.x), encode_field(&self.0.y))
    }

    /// Decode a point and check it lies in the prime-order subgroup.
    pub fn decode(encoded: &EncodedPoint) -> Result<Self, CryptoError> {
        let x = decode_field::<BaseField>(encoded.x())?;
        let y = decode_field::<BaseField>(encoded.y())?;
        let point = EdwardsAffine::new_unchecked(x, y);
        if !point.is_on_curve() {
            return Err(CryptoError::PointNotOnCurve);
        }
        if !point.is_in_correct_subgroup_assuming_on_curve() {
            return Err(CryptoError::PointNotInSubgroup);
        }
        Ok(Self(point))
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::identity()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point((self.0.into_group() + rhs.0.into_group()).into_affine())
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        *self = *self + rhs;
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point((self.0.into_group() - rhs.0.into_group()).into_affine())
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point(-self.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;

    fn mul(self, rhs: Scalar) -> Point {
        self.scalar_mul(&rhs)
    }
}

impl Sum for Point {
    fn sum<I: Iterator<Item = Point>>(iter: I) -> Point {
        iter.fold(Point::identity(), |acc, p| acc + p)
    }
}

/// Encode a slice of points for the ledger.
pub fn encode_points(points: &[Point]) -> Vec<EncodedPoint> {
    points.iter().map(Point::encode).collect()
}

/// Decode a slice of ledger points, validating each one.
pub fn decode_points(points: &[EncodedPoint]) -> Result<Vec<Point>, CryptoError> {
    points.iter().map(Point::decode).collect()
}
