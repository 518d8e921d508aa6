//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid field element encoding: {0}")]
    InvalidFieldElement(String),

    #[error("Field element out of range: {0}")]
    FieldElementOutOfRange(String),

    #[error("Invalid scalar encoding")]
    InvalidScalar,

    #[error("Point not on curve")]
    PointNotOnCurve,

    #[error("Point not in prime-order subgroup")]
    PointNotInSubgroup,

    #[error("Poseidon hash failed: {0}")]
    Poseidon(String),

    #[error("Insufficient threshold shares: need {required}, got {got}")]
    InsufficientShares { required: usize, got: usize },

    #[error("Duplicate share index")]
    DuplicateShareIndex,

    #[error("Lagrange interpolation failed")]
    LagrangeInterpolationFailed,

    #[error("Discrete log not found below bound {0}")]
    DiscreteLogNotFound(u64),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),
}
