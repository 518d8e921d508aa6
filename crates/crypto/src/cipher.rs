//! ShareCipher: encryption of a secret-share scalar to a committee member.
//!
//! ```text
//! encrypt(m, PK):  e  <- random mod r
//!                  E  =  e·G
//!                  ks =  Poseidon((e·PK).x)
//!                  c  =  m + ks            (mod p)
//!
//! decrypt(E, c, sk): c - Poseidon((sk·E).x)  (mod p)
//! ```
//!
//! `p` is the BN254 scalar field (the proof-system field), not the group order.
//! There is no authentication tag: a wrong key yields a wrong value, which the
//! caller must catch with a Feldman check.

use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};
use rand::{CryptoRng, RngCore};

use crate::curve::{BaseField, Point, Scalar};
use crate::error::CryptoError;

/// Ciphertext of one share as published on the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptedShare {
    pub ephemeral_pk: Point,
    pub ciphertext: BaseField,
}

/// Output of [`encrypt`]; the ephemeral secret is a witness of the round-2 proof.
#[derive(Clone, Debug)]
pub struct ShareEncryption {
    pub ephemeral_sk: Scalar,
    pub share: EncryptedShare,
}

fn to_bn254(value: &BaseField) -> ark_bn254::Fr {
    ark_bn254::Fr::from_le_bytes_mod_order(&value.into_bigint().to_bytes_le())
}

fn from_bn254(value: &ark_bn254::Fr) -> BaseField {
    BaseField::from_le_bytes_mod_order(&value.into_bigint().to_bytes_le())
}

/// circomlib-compatible Poseidon over the BN254 scalar field.
pub fn poseidon_hash(inputs: &[BaseField]) -> Result<BaseField, CryptoError> {
    let mut hasher = Poseidon::<ark_bn254::Fr>::new_circom(inputs.len())
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    let inputs: Vec<ark_bn254::Fr> = inputs.iter().map(to_bn254).collect();
    let digest = hasher
        .hash(&inputs)
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    Ok(from_bn254(&digest))
}

/// Keystream derived from a Diffie-Hellman shared point.
pub fn keystream(shared: &Point) -> Result<BaseField, CryptoError> {
    poseidon_hash(&[shared.x()])
}

/// Encrypt `msg` to `recipient_pk` with a fresh ephemeral key.
pub fn encrypt<R: RngCore + CryptoRng>(
    msg: &Scalar,
    recipient_pk: &Point,
    rng: &mut R,
) -> Result<ShareEncryption, CryptoError> {
    let ephemeral_sk = Scalar::random(rng);
    let share = encrypt_with_ephemeral(msg, recipient_pk, &ephemeral_sk)?;
    Ok(ShareEncryption {
        ephemeral_sk,
        share,
    })
}

/// Deterministic encryption under a given ephemeral secret.
pub fn encrypt_with_ephemeral(
    msg: &Scalar,
    recipient_pk: &Point,
    ephemeral_sk: &Scalar,
) -> Result<EncryptedShare, CryptoError> {
    let ephemeral_pk = Point::from_scalar(ephemeral_sk);
    let ks = keystream(&recipient_pk.scalar_mul(ephemeral_sk))?;
    Ok(EncryptedShare {
        ephemeral_pk,
        ciphertext: msg.to_base_field() + ks,
    })
}

/// Decrypt a share. The result is in `[0, p)` and is only meaningful once
/// verified against the sender's commitments.
pub fn decrypt(
    ephemeral_pk: &Point,
    ciphertext: &BaseField,
    sk: &Scalar,
) -> Result<BaseField, CryptoError> {
    let ks = keystream(&ephemeral_pk.scalar_mul(sk))?;
    Ok(*ciphertext - ks)
}
