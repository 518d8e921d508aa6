//! Core type definitions for the threshold voting protocol.
//!
//! This crate provides the wire-level data structures shared by the committee,
//! voters and the ledger. Every numeric value that crosses the ledger boundary
//! is carried as a decimal-string field element, matching the encoding used by
//! the contracts and the proof circuits.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use sha2::{Digest, Sha256};
use std::fmt;

// =========================
// FIELD ENCODING
// =========================

/// A field element encoded as a decimal string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldElement(pub String);

impl FieldElement {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Curve point as `[x, y]` decimal-string coordinates (Solidity `uint[2]`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedPoint(pub [FieldElement; 2]);

impl EncodedPoint {
    pub fn new(x: FieldElement, y: FieldElement) -> Self {
        Self([x, y])
    }

    pub fn x(&self) -> &FieldElement {
        &self.0[0]
    }

    pub fn y(&self) -> &FieldElement {
        &self.0[1]
    }
}

/// Public signals of a proof, in circuit order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicSignals(pub Vec<FieldElement>);

/// An opaque proof, serialized as a sequence of field elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub elements: Vec<FieldElement>,
}

// =========================
// IDENTITIES
// =========================

/// Ledger account address (32 bytes).
pub type Address = [u8; 32];

/// Committee member id (1-based).
pub type MemberId = u32;

/// Voting proposal id.
pub type ProposalId = u64;

/// Compute the ledger address controlled by a public verification key.
pub fn compute_address(verifying_key: &[u8]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"zkvote-address-v1");
    hasher.update(verifying_key);
    hasher.finalize().into()
}

/// Parse a hex address, with or without `0x` prefix.
pub fn parse_address(s: &str) -> Option<Address> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

/// Format an address as `0x`-prefixed hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

// =========================
// VOTING
// =========================

/// Number of outcomes carried by every ballot.
pub const VOTE_OPTIONS: usize = 3;

/// A voter's choice. Ciphertexts are always laid out in `ALL` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Abstain,
    Nay,
    Yay,
}

impl VoteChoice {
    pub const ALL: [VoteChoice; VOTE_OPTIONS] = [VoteChoice::Abstain, VoteChoice::Nay, VoteChoice::Yay];

    /// Position of this choice in ciphertext and totals arrays.
    pub fn index(self) -> usize {
        match self {
            VoteChoice::Abstain => 0,
            VoteChoice::Nay => 1,
            VoteChoice::Yay => 2,
        }
    }

    /// One-hot selector witnessed by the vote circuit.
    pub fn bitmask(self) -> u8 {
        1 << self.index()
    }

    pub fn from_bitmask(o: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.bitmask() == o)
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteChoice::Abstain => f.write_str("abstain"),
            VoteChoice::Nay => f.write_str("nay"),
            VoteChoice::Yay => f.write_str("yay"),
        }
    }
}

impl std::str::FromStr for VoteChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abstain" => Ok(VoteChoice::Abstain),
            "nay" | "no" => Ok(VoteChoice::Nay),
            "yay" | "yes" => Ok(VoteChoice::Yay),
            other => Err(format!("unknown vote choice: {}", other)),
        }
    }
}

/// Encrypted ballot as submitted to the ledger: one `(R, M)` pair per outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBallot {
    pub r: [EncodedPoint; VOTE_OPTIONS],
    pub m: [EncodedPoint; VOTE_OPTIONS],
}

/// Per-outcome vote totals in `VoteChoice::ALL` order.
pub type VoteTotals = [u64; VOTE_OPTIONS];

// =========================
// LEDGER SUBMISSIONS AND EVENTS
// =========================

/// Round 2 publication: one encrypted share from the sender to `recipient_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2Submission {
    pub recipient_id: MemberId,
    /// ShareCipher ciphertext, an element of the proof-system scalar field
    pub ciphertext: FieldElement,
    pub ephemeral_pk: EncodedPoint,
    /// `f_i(recipient_id)·G`
    pub share_commitment: EncodedPoint,
    pub proof: Proof,
}

/// `Round2Share(recipientId indexed, senderId, ciphertext, ephemeralPK)`
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2ShareEvent {
    #[serde_as(as = "DisplayFromStr")]
    pub block_number: u64,
    pub recipient_id: MemberId,
    pub sender_id: MemberId,
    pub ciphertext: FieldElement,
    pub ephemeral_pk: EncodedPoint,
}

/// `SetupVote(proposalId indexed, endBlock)`
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupVoteEvent {
    #[serde_as(as = "DisplayFromStr")]
    pub block_number: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub proposal_id: ProposalId,
    #[serde_as(as = "DisplayFromStr")]
    pub end_block: u64,
}

/// `TallyComplete(proposalId indexed, totals)`
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyCompleteEvent {
    #[serde_as(as = "DisplayFromStr")]
    pub block_number: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub proposal_id: ProposalId,
    pub totals: VoteTotals,
}

// =========================
// DESCRIPTORS
// =========================

/// Descriptor of a deployed DKG contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgDescriptor {
    pub address: String,
    pub n_comm: u32,
    pub threshold: u32,
}

/// Descriptor of a deployed voting contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingDescriptor {
    pub address: String,
    pub block_number_before_deploy: u64,
}

/// Both contracts of one deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub dkg: DkgDescriptor,
    pub voting: VotingDescriptor,
}
