//! Cryptographic primitives for threshold-encrypted private voting.
//!
//! All arithmetic happens on the BabyJubJub twisted Edwards curve, whose
//! coordinate field is the BN254 scalar field used by the proof circuits.
//!
//! # Overview
//!
//! 1. **Curve** (`curve`): typed [`Scalar`] and [`Point`] values with
//!    validated decoding from the ledger's decimal-string representation.
//!
//! 2. **Polynomials** (`polynomial`): Horner evaluation over scalars and over
//!    committed coefficients, the basis of Feldman share verification.
//!
//! 3. **ShareCipher** (`cipher`): Diffie-Hellman plus a Poseidon keystream,
//!    used to deliver DKG shares through the public ledger.
//!
//! 4. **ElGamal** (`elgamal`) and **threshold** (`threshold`): weighted vote
//!    ciphertexts, partial decryptions `sk_i·R` and their Lagrange combination.
//!
//! 5. **Seed derivation** (`derive`): deterministic round-1 secrets from a
//!    member's signing key, so a restarted member can recover its share.

pub mod cipher;
pub mod curve;
pub mod derive;
pub mod elgamal;
pub mod error;
pub mod polynomial;
pub mod threshold;

pub use cipher::{decrypt, encrypt, EncryptedShare, ShareEncryption};
pub use curve::{decode_points, encode_points, BaseField, Point, Scalar, ScalarField};
pub use derive::{derive_seed, SigningCapability, DKG_SEED_DOMAIN};
pub use elgamal::{partial_decrypt, Ciphertext};
pub use error::CryptoError;
pub use polynomial::{evaluate_group, evaluate_scalar};
pub use threshold::{combine_partial_decryptions, lagrange_coefficient, recover_discrete_log};
