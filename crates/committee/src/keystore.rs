//! Member key file and persisted DKG output.
//!
//! The key file holds a hex-encoded 32-byte Ed25519 seed. It is the
//! member's signing capability: its verifying key determines the ledger
//! address and its signature over a fixed domain tag determines `a_0`.
//!
//! After a DKG the member's share is written to a JSON state file so that
//! later processes can tally without rerunning the protocol.

use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use zkvote_crypto::derive::generate_signing_key;
use zkvote_crypto::{CryptoError, Point, Scalar};
use zkvote_dkg::{CommitteeMember, DkgError};
use zkvote_types::{compute_address, Address, EncodedPoint, FieldElement, MemberId};

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid key file {}: {reason}", path.display())]
    InvalidKey { path: PathBuf, reason: String },

    #[error("Refusing to overwrite existing key file {}", .0.display())]
    KeyExists(PathBuf),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Dkg(#[from] DkgError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> KeystoreError + '_ {
    move |source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Ledger address of the member holding `key`.
pub fn member_address(key: &SigningKey) -> Address {
    compute_address(key.verifying_key().as_bytes())
}

/// Create a new key file. Fails if one already exists.
pub fn generate_key_file<R: RngCore + CryptoRng>(
    path: &Path,
    rng: &mut R,
) -> Result<SigningKey, KeystoreError> {
    if path.exists() {
        return Err(KeystoreError::KeyExists(path.to_path_buf()));
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
    }
    let key = generate_signing_key(rng);
    let mut encoded = hex::encode(key.to_bytes());
    let written = fs::write(path, &encoded).map_err(io_err(path));
    encoded.zeroize();
    written?;
    Ok(key)
}

pub fn load_signing_key(path: &Path) -> Result<SigningKey, KeystoreError> {
    let invalid = |reason: String| KeystoreError::InvalidKey {
        path: path.to_path_buf(),
        reason,
    };
    let mut data = fs::read_to_string(path).map_err(io_err(path))?;
    let decoded = hex::decode(data.trim());
    data.zeroize();
    let mut bytes = decoded.map_err(|e| invalid(e.to_string()))?;
    let seed: Result<[u8; 32], _> = bytes.as_slice().try_into();
    bytes.zeroize();
    let mut seed = seed.map_err(|_| invalid("expected 32 bytes".into()))?;
    let key = SigningKey::from_bytes(&seed);
    seed.zeroize();
    Ok(key)
}

/// A member's DKG output as stored on disk.
#[derive(Clone, Serialize, Deserialize)]
pub struct MemberState {
    pub member_id: MemberId,
    pub threshold: u32,
    pub n_comm: u32,
    pub secret_share: FieldElement,
    pub public_share: EncodedPoint,
    pub public_key: EncodedPoint,
}

impl MemberState {
    pub fn from_member(member: &CommitteeMember) -> Self {
        Self {
            member_id: member.member_id,
            threshold: member.threshold,
            n_comm: member.n_comm,
            secret_share: member.secret_share().encode(),
            public_share: member.public_share.encode(),
            public_key: member.public_key.encode(),
        }
    }

    /// Rebuild the member, checking the share against its public share.
    pub fn to_member(&self) -> Result<CommitteeMember, KeystoreError> {
        Ok(CommitteeMember::new(
            self.member_id,
            self.threshold,
            self.n_comm,
            Scalar::decode(&self.secret_share)?,
            Point::decode(&self.public_share)?,
            Point::decode(&self.public_key)?,
        )?)
    }

    pub fn state_file(data_dir: &Path) -> PathBuf {
        data_dir.join("member-state.json")
    }

    pub fn load(path: &Path) -> Result<Self, KeystoreError> {
        let data = fs::read_to_string(path).map_err(io_err(path))?;
        serde_json::from_str(&data).map_err(|source| KeystoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), KeystoreError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| KeystoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(io_err(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rand::Rng;

    fn scratch_dir() -> PathBuf {
        let suffix: u64 = OsRng.gen();
        std::env::temp_dir().join(format!("zkvote-keystore-{:016x}", suffix))
    }

    #[test]
    fn test_key_file_roundtrip() {
        let dir = scratch_dir();
        let path = dir.join("member.key");
        let key = generate_key_file(&path, &mut OsRng).unwrap();
        let loaded = load_signing_key(&path).unwrap();
        assert_eq!(member_address(&key), member_address(&loaded));
        assert!(matches!(
            generate_key_file(&path, &mut OsRng),
            Err(KeystoreError::KeyExists(_))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_rejects_short_key() {
        let dir = scratch_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("member.key");
        fs::write(&path, "abcd").unwrap();
        assert!(matches!(
            load_signing_key(&path),
            Err(KeystoreError::InvalidKey { .. })
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_member_state_roundtrip() {
        let dir = scratch_dir();
        let path = MemberState::state_file(&dir);
        let sk = Scalar::random(&mut OsRng);
        let member = CommitteeMember::new(
            2,
            2,
            3,
            sk,
            Point::from_scalar(&sk),
            Point::from_scalar(&Scalar::random(&mut OsRng)),
        )
        .unwrap();

        MemberState::from_member(&member).save(&path).unwrap();
        let restored = MemberState::load(&path).unwrap().to_member().unwrap();
        assert_eq!(restored.secret_share(), member.secret_share());
        assert_eq!(restored.public_key, member.public_key);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_tampered_state_rejected() {
        let sk = Scalar::random(&mut OsRng);
        let member =
            CommitteeMember::new(1, 1, 1, sk, Point::from_scalar(&sk), Point::generator()).unwrap();
        let mut state = MemberState::from_member(&member);
        state.secret_share = (sk + Scalar::one()).encode();
        assert!(matches!(
            state.to_member(),
            Err(KeystoreError::Dkg(DkgError::ShareReconstruction { .. }))
        ));
    }
}
