//! DKG errors.

use thiserror::Error;

use zkvote_crypto::CryptoError;
use zkvote_ledger::LedgerError;
use zkvote_prover::ProverError;
use zkvote_types::MemberId;

use crate::types::DkgPhase;

#[derive(Debug, Error)]
pub enum DkgError {
    #[error("Invalid DKG configuration: {0}")]
    InvalidConfig(String),

    #[error("Ledger call failed during {phase}: {source}")]
    Ledger {
        phase: DkgPhase,
        #[source]
        source: LedgerError,
    },

    #[error("Proving round 2 share for member {recipient} failed: {source}")]
    Prover {
        recipient: MemberId,
        #[source]
        source: ProverError,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Local share for member {recipient} does not match own commitments")]
    LocalShareMismatch { recipient: MemberId },

    #[error("Expected {expected} round 2 shares for member {member_id}, found {got}")]
    ShareCountMismatch {
        member_id: MemberId,
        expected: usize,
        got: usize,
    },

    #[error("Round 2 share from member {sender_id} to member {member_id} fails the Feldman check")]
    InvalidShare {
        member_id: MemberId,
        sender_id: MemberId,
    },

    #[error("Secret share reconstruction failed for member {member_id}: {reason}")]
    ShareReconstruction { member_id: MemberId, reason: String },

    #[error("Derived round 1 key for member {member_id} does not match the ledger")]
    RecoveryMismatch { member_id: MemberId },

    #[error("Cannot run {operation} in phase {phase}")]
    OutOfOrder {
        operation: &'static str,
        phase: DkgPhase,
    },
}
