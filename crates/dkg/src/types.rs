//! DKG type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use zkvote_crypto::{BaseField, Point, Scalar};
use zkvote_ledger::Ledger;
use zkvote_types::MemberId;

use crate::error::DkgError;

/// DKG configuration for one committee member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgConfig {
    /// Committee size
    pub n: u32,
    /// Threshold (polynomial length, minimum partial decryptions)
    pub threshold: u32,
    /// This member's 1-based id
    pub member_id: MemberId,
    /// First block to scan for round-2 share events
    pub from_block: u64,
}

impl DkgConfig {
    pub fn new(n: u32, threshold: u32, member_id: MemberId) -> Result<Self, DkgError> {
        if threshold == 0 || threshold > n {
            return Err(DkgError::InvalidConfig(format!(
                "threshold {} outside 1..={}",
                threshold, n
            )));
        }
        if member_id == 0 || member_id > n {
            return Err(DkgError::InvalidConfig(format!(
                "member id {} outside 1..={}",
                member_id, n
            )));
        }
        Ok(Self {
            n,
            threshold,
            member_id,
            from_block: 0,
        })
    }

    pub fn with_from_block(mut self, from_block: u64) -> Self {
        self.from_block = from_block;
        self
    }

    /// Read committee parameters and this sender's member id from the ledger.
    pub async fn from_ledger<L: Ledger + ?Sized>(ledger: &L) -> Result<Self, DkgError> {
        let phase = DkgPhase::Created;
        let member_id = ledger
            .member_id(ledger.sender())
            .await
            .map_err(|source| DkgError::Ledger { phase, source })?;
        let n = ledger
            .n_comm()
            .await
            .map_err(|source| DkgError::Ledger { phase, source })?;
        let threshold = ledger
            .threshold()
            .await
            .map_err(|source| DkgError::Ledger { phase, source })?;
        let deployment = ledger
            .deployment()
            .await
            .map_err(|source| DkgError::Ledger { phase, source })?;
        Ok(Self::new(n, threshold, member_id)?
            .with_from_block(deployment.voting.block_number_before_deploy))
    }
}

/// Progress of a member through the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DkgPhase {
    Created,
    Round1Posted,
    Round1Complete,
    Round2Posted,
    Round2Complete,
    Recovered,
}

impl fmt::Display for DkgPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DkgPhase::Created => "created",
            DkgPhase::Round1Posted => "round 1 posted",
            DkgPhase::Round1Complete => "round 1 complete",
            DkgPhase::Round2Posted => "round 2 posted",
            DkgPhase::Round2Complete => "round 2 complete",
            DkgPhase::Recovered => "recovered",
        };
        f.write_str(name)
    }
}

/// An encrypted share addressed to this member, decoded from the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round2Share {
    pub sender_id: MemberId,
    pub ciphertext: BaseField,
    pub ephemeral_pk: Point,
}

/// Output of a completed DKG: a member able to produce partial decryptions.
#[derive(Clone)]
pub struct CommitteeMember {
    pub member_id: MemberId,
    pub threshold: u32,
    pub n_comm: u32,
    /// `sk_i·G`, as published by the ledger
    pub public_share: Point,
    /// Aggregate committee key
    pub public_key: Point,
    secret_share: Scalar,
}

impl CommitteeMember {
    /// Fails unless `secret_share·G == public_share`.
    pub fn new(
        member_id: MemberId,
        threshold: u32,
        n_comm: u32,
        secret_share: Scalar,
        public_share: Point,
        public_key: Point,
    ) -> Result<Self, DkgError> {
        if Point::from_scalar(&secret_share) != public_share {
            return Err(DkgError::ShareReconstruction {
                member_id,
                reason: "secret share does not match public share".into(),
            });
        }
        Ok(Self {
            member_id,
            threshold,
            n_comm,
            public_share,
            public_key,
            secret_share,
        })
    }

    pub fn secret_share(&self) -> &Scalar {
        &self.secret_share
    }
}

impl fmt::Debug for CommitteeMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitteeMember")
            .field("member_id", &self.member_id)
            .field("threshold", &self.threshold)
            .field("n_comm", &self.n_comm)
            .field("public_share", &self.public_share)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl Drop for CommitteeMember {
    fn drop(&mut self) {
        self.secret_share.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_config_bounds() {
        assert!(DkgConfig::new(3, 2, 1).is_ok());
        assert!(DkgConfig::new(3, 0, 1).is_err());
        assert!(DkgConfig::new(3, 4, 1).is_err());
        assert!(DkgConfig::new(3, 2, 0).is_err());
        assert!(DkgConfig::new(3, 2, 4).is_err());
    }

    #[test]
    fn test_member_checks_public_share() {
        let sk = Scalar::random(&mut OsRng);
        let pk = Point::from_scalar(&Scalar::random(&mut OsRng));
        assert!(CommitteeMember::new(1, 2, 3, sk, Point::from_scalar(&sk), pk).is_ok());
        assert!(matches!(
            CommitteeMember::new(1, 2, 3, sk, pk, pk),
            Err(DkgError::ShareReconstruction { member_id: 1, .. })
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let sk = Scalar::from(7u64);
        let member =
            CommitteeMember::new(2, 2, 3, sk, Point::from_scalar(&sk), Point::generator()).unwrap();
        let printed = format!("{:?}", member);
        assert!(printed.contains("member_id: 2"));
        assert!(!printed.contains("secret_share"));
    }
}
