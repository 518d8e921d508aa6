//! Proof generation and verification for the voting circuits.
//!
//! The rest of the system treats proving as an opaque, possibly slow call
//! behind the [`Prover`] trait: `prove(circuit, public, private)` returns a
//! proof and the public signals it attests to, and `verify(key, signals,
//! proof)` answers yes or no. The ledger verifies every round-2 share,
//! ballot and partial decryption through the same trait.
//!
//! [`SigmaProver`] is the native backend.

pub mod circuits;
pub mod error;
pub mod sigma;

pub use circuits::{
    Circuit, NvoteStatement, NvoteWitness, PrivateInputs, Round2Statement, Round2Witness,
    Statement, TallyStatement, TallyWitness, VerificationKey, Witness,
};
pub use error::ProverError;
pub use sigma::SigmaProver;

use zkvote_types::{Proof, PublicSignals};

/// A proving system for the three protocol circuits.
pub trait Prover: Send + Sync {
    /// Produce a proof that `private` satisfies `circuit` for `public`.
    ///
    /// Fails with [`ProverError::UnsatisfiedWitness`] when it does not; that
    /// failure is deterministic and must not be retried.
    fn prove(
        &self,
        circuit: Circuit,
        public: &PublicSignals,
        private: &PrivateInputs,
    ) -> Result<(Proof, PublicSignals), ProverError>;

    fn verification_key(&self, circuit: Circuit) -> VerificationKey;

    /// Malformed signals or proofs verify as `false`.
    fn verify(&self, key: &VerificationKey, public: &PublicSignals, proof: &Proof) -> bool;
}

/// Prove a typed statement.
pub fn prove_statement<P, S, W>(prover: &P, statement: &S, witness: &W) -> Result<Proof, ProverError>
where
    P: Prover + ?Sized,
    S: Statement,
    W: Witness,
{
    if S::CIRCUIT != W::CIRCUIT {
        return Err(ProverError::KeyMismatch {
            expected: S::CIRCUIT,
            got: W::CIRCUIT,
        });
    }
    let (proof, _) = prover.prove(S::CIRCUIT, &statement.to_signals(), &witness.to_private())?;
    Ok(proof)
}

/// Verify a proof against a typed statement.
pub fn verify_statement<P, S>(
    prover: &P,
    key: &VerificationKey,
    statement: &S,
    proof: &Proof,
) -> Result<bool, ProverError>
where
    P: Prover + ?Sized,
    S: Statement,
{
    if key.circuit != S::CIRCUIT {
        return Err(ProverError::KeyMismatch {
            expected: S::CIRCUIT,
            got: key.circuit,
        });
    }
    Ok(prover.verify(key, &statement.to_signals(), proof))
}
