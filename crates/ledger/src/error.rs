//! Ledger error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use zkvote_crypto::CryptoError;
use zkvote_prover::Circuit;
use zkvote_types::{MemberId, ProposalId};

/// Errors returned by ledger reads and writes.
///
/// Contract rejections are deterministic. Only the variants reported by
/// [`LedgerError::is_transient`] are worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LedgerError {
    #[error("Contracts not deployed")]
    NotDeployed,

    #[error("Contracts already deployed")]
    AlreadyDeployed,

    #[error("Invalid deployment: {0}")]
    InvalidDeployment(String),

    #[error("Sender {0} is not a committee member")]
    NotCommitteeMember(String),

    #[error("Invalid member id: {0}")]
    InvalidMemberId(MemberId),

    #[error("Expected {expected} coefficient commitments, got {got}")]
    InvalidCommitmentCount { expected: usize, got: usize },

    #[error("Member {0} already posted different round 1 commitments")]
    Round1AlreadyPosted(MemberId),

    #[error("Member {0} has not posted round 1 commitments")]
    Round1NotPosted(MemberId),

    #[error("Round 1 is not complete")]
    Round1Incomplete,

    #[error("Share from {sender} to {recipient} already posted")]
    Round2AlreadyPosted { sender: MemberId, recipient: MemberId },

    #[error("Round 2 is not complete")]
    Round2Incomplete,

    #[error("Invalid {0} proof")]
    InvalidProof(Circuit),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Proposal already exists: {0}")]
    ProposalExists(ProposalId),

    #[error("End block {end_block} is not after current block {current}")]
    InvalidDeadline { end_block: u64, current: u64 },

    #[error("Voting closed for proposal {0}")]
    VotingClosed(ProposalId),

    #[error("Already voted on proposal {0}")]
    AlreadyVoted(ProposalId),

    #[error("Voter {0} is not registered")]
    NotRegistered(String),

    #[error("Voting weight limit exceeded: used {used}, adding {weight}, max {max}")]
    WeightLimitExceeded { used: u64, weight: u64, max: u64 },

    #[error("Member {member_id} already tallied proposal {proposal_id}")]
    AlreadyTallied {
        proposal_id: ProposalId,
        member_id: MemberId,
    },

    #[error("Tally already complete for proposal {0}")]
    TallyAlreadyComplete(ProposalId),

    #[error("Could not recover vote totals for proposal {0}")]
    TallyRecoveryFailed(ProposalId),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out waiting for {what} after {polls} polls")]
    Timeout { what: String, polls: u32 },

    #[error("Descriptor error: {0}")]
    Descriptor(String),
}

impl LedgerError {
    /// True for failures caused by racing writers or the connection, not by
    /// the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::WriteConflict(_) | LedgerError::Transport(_))
    }
}

impl From<CryptoError> for LedgerError {
    fn from(e: CryptoError) -> Self {
        LedgerError::InvalidEncoding(e.to_string())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LedgerError::WriteConflict("nonce too low".into()).is_transient());
        assert!(LedgerError::Transport("connection reset".into()).is_transient());
        assert!(!LedgerError::InvalidProof(Circuit::Tally).is_transient());
        assert!(!LedgerError::TallyAlreadyComplete(1).is_transient());
    }

    #[test]
    fn test_error_survives_json() {
        let err = LedgerError::Round2AlreadyPosted {
            sender: 1,
            recipient: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: LedgerError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);

        let err = LedgerError::InvalidProof(Circuit::Nvote);
        let back: LedgerError = serde_json::from_str(&serde_json::to_string(&err).unwrap()).unwrap();
        assert_eq!(back, err);
    }
}
