//! The ledger boundary used by committee members and voters.

use async_trait::async_trait;

use zkvote_types::{
    Address, Deployment, EncodedBallot, EncodedPoint, MemberId, Proof, ProposalId,
    Round2ShareEvent, Round2Submission, SetupVoteEvent, TallyCompleteEvent, VoteTotals,
    VOTE_OPTIONS,
};

use crate::error::LedgerResult;

/// A connection to the DKG and voting contracts, bound to one sender.
///
/// Writes are submitted as `sender` and resolve once the transaction is
/// included in a block. All values cross this boundary in their
/// decimal-string encoding.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Account that signs this connection's writes.
    fn sender(&self) -> Address;

    async fn block_number(&self) -> LedgerResult<u64>;

    async fn deployment(&self) -> LedgerResult<Deployment>;

    // === DKG contract ===

    async fn n_comm(&self) -> LedgerResult<u32>;

    async fn threshold(&self) -> LedgerResult<u32>;

    /// 1-based committee id of `address`.
    async fn member_id(&self, address: Address) -> LedgerResult<MemberId>;

    async fn round1(&self, commitments: Vec<EncodedPoint>) -> LedgerResult<()>;

    async fn round1_complete(&self) -> LedgerResult<bool>;

    async fn get_round1_pk_for(&self, id: MemberId) -> LedgerResult<EncodedPoint>;

    /// Full round-1 coefficient commitment vector posted by `id`.
    async fn get_round1_commitments(&self, id: MemberId) -> LedgerResult<Vec<EncodedPoint>>;

    async fn round2(&self, submission: Round2Submission) -> LedgerResult<()>;

    async fn round2_share_received(&self, sender: MemberId, recipient: MemberId)
        -> LedgerResult<bool>;

    async fn round2_complete(&self) -> LedgerResult<bool>;

    async fn pk_coefficients(&self) -> LedgerResult<Vec<EncodedPoint>>;

    async fn get_pk_for(&self, id: MemberId) -> LedgerResult<EncodedPoint>;

    async fn get_pk(&self) -> LedgerResult<EncodedPoint>;

    /// `Round2Share` events addressed to `recipient` in `[from_block, to_block]`.
    async fn round2_share_events(
        &self,
        recipient: MemberId,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<Round2ShareEvent>>;

    // === Voting contract ===

    async fn add_voter(&self, voter: Address, weight: u64) -> LedgerResult<()>;

    async fn get_voting_weight(&self, voter: Address) -> LedgerResult<u64>;

    async fn has_voted(&self, proposal_id: ProposalId, voter: Address) -> LedgerResult<bool>;

    async fn setup_vote(&self, proposal_id: ProposalId, end_block: u64) -> LedgerResult<()>;

    async fn setup_vote_events(&self, from_block: u64, to_block: u64)
        -> LedgerResult<Vec<SetupVoteEvent>>;

    async fn vote(
        &self,
        proposal_id: ProposalId,
        ballot: EncodedBallot,
        proof: Proof,
    ) -> LedgerResult<()>;

    async fn get_r(&self, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]>;

    async fn get_m(&self, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]>;

    async fn voting_weight_used(&self, proposal_id: ProposalId) -> LedgerResult<u64>;

    async fn tally(
        &self,
        proposal_id: ProposalId,
        d: [EncodedPoint; VOTE_OPTIONS],
        proof: Proof,
    ) -> LedgerResult<()>;

    async fn is_tally_complete(&self, proposal_id: ProposalId) -> LedgerResult<bool>;

    async fn tally_complete_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<TallyCompleteEvent>>;

    async fn get_vote_totals(&self, proposal_id: ProposalId) -> LedgerResult<VoteTotals>;
}
