//! Deterministic secret derivation from a signing key.
//!
//! A committee member's round-1 secret `a_0` is derived by signing a fixed
//! domain message and reducing the leading signature bytes modulo the group
//! order. With a deterministic signature scheme the member can recompute
//! `a_0` after a restart and recover its share from the ledger.

use ark_ff::PrimeField;
use ed25519_dalek::{Signer, SigningKey};
use rand::{CryptoRng, RngCore};

use crate::curve::{Scalar, ScalarField};
use crate::error::CryptoError;

/// Domain tag for the DKG round-1 secret.
pub const DKG_SEED_DOMAIN: &str = "zkvote/dkg/round1-secret/v1";

/// Anything able to produce a deterministic signature over a message.
pub trait SigningCapability {
    fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

impl SigningCapability for SigningKey {
    fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.sign(message).to_bytes().to_vec())
    }
}

/// Bytes needed to hold `r - 1`.
fn scalar_byte_length() -> usize {
    (ScalarField::MODULUS_BIT_SIZE as usize + 7) / 8
}

/// Derive a scalar from `signer`'s signature over `domain_tag`.
pub fn derive_seed<S: SigningCapability + ?Sized>(
    domain_tag: &str,
    signer: &S,
) -> Result<Scalar, CryptoError> {
    let signature = signer.sign_message(domain_tag.as_bytes())?;
    let needed = scalar_byte_length();
    if signature.len() < needed {
        return Err(CryptoError::KeyDerivationFailed(format!(
            "insufficient bytes in signature: need {}, got {}",
            needed,
            signature.len()
        )));
    }
    Ok(Scalar::from_be_bytes_mod_order(&signature[..needed]))
}

/// Generate a fresh member signing key.
pub fn generate_signing_key<R: RngCore + CryptoRng>(rng: &mut R) -> SigningKey {
    SigningKey::generate(rng)
}
