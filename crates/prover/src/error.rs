//! Prover error types.

use thiserror::Error;

use zkvote_crypto::CryptoError;

use crate::circuits::Circuit;

/// Errors raised by proof generation and verification.
///
/// `UnsatisfiedWitness` is deterministic: retrying the same inputs reproduces it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProverError {
    #[error("{circuit} witness does not satisfy the circuit: {reason}")]
    UnsatisfiedWitness { circuit: Circuit, reason: String },

    #[error("Malformed {circuit} public signals: {reason}")]
    MalformedSignals { circuit: Circuit, reason: String },

    #[error("Malformed {circuit} private inputs: {reason}")]
    MalformedPrivateInputs { circuit: Circuit, reason: String },

    #[error("Malformed {circuit} proof: {reason}")]
    MalformedProof { circuit: Circuit, reason: String },

    #[error("Verification key mismatch: expected {expected}, got {got}")]
    KeyMismatch { expected: Circuit, got: Circuit },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
