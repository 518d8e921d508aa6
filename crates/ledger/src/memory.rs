//! In-process ledger shared by every member of a test or a mock chain.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use zkvote_prover::Prover;
use zkvote_types::{
    format_address, Address, Deployment, EncodedBallot, EncodedPoint, MemberId, Proof,
    ProposalId, Round2ShareEvent, Round2Submission, SetupVoteEvent, TallyCompleteEvent,
    VoteTotals, VOTE_OPTIONS,
};

use crate::error::{LedgerError, LedgerResult};
use crate::handlers::{self, CallContext, HandlerResult};
use crate::ledger::Ledger;
use crate::queries;
use crate::state::ChainState;

/// Shared chain state plus the verifier the contracts call into.
#[derive(Clone)]
pub struct InMemoryChain {
    state: Arc<RwLock<ChainState>>,
    verifier: Arc<dyn Prover>,
}

impl InMemoryChain {
    pub fn new(verifier: Arc<dyn Prover>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState::new())),
            verifier,
        }
    }

    /// Deploy both contracts with the given committee (member `i` is
    /// `committee[i - 1]`).
    pub fn deploy(
        &self,
        committee: Vec<Address>,
        threshold: u32,
        max_total_voting_weight: u64,
    ) -> LedgerResult<Deployment> {
        self.write([0u8; 32], |state, ctx, verifier| {
            handlers::handle_deploy(
                state,
                ctx,
                committee,
                threshold,
                max_total_voting_weight,
                verifier,
            )
        })
    }

    /// A ledger connection signing as `sender`.
    pub fn connect(&self, sender: Address) -> InMemoryLedger {
        InMemoryLedger {
            chain: self.clone(),
            sender,
        }
    }

    pub fn block_number(&self) -> u64 {
        self.state.read().block_number
    }

    /// Mine `n` empty blocks.
    pub fn advance_blocks(&self, n: u64) -> u64 {
        let head = self.state.write().advance_blocks(n);
        debug!(head, "advanced blocks");
        head
    }

    /// Reject the next `n` writes with a write conflict.
    pub fn inject_write_conflicts(&self, n: u32) {
        self.state.write().injected_conflicts += n;
    }

    /// Apply the next `n` accepted writes but fail their responses with a
    /// transport error, as if the connection dropped after inclusion.
    pub fn inject_lost_responses(&self, n: u32) {
        self.state.write().lost_responses += n;
    }

    fn read<T>(&self, f: impl FnOnce(&ChainState) -> LedgerResult<T>) -> LedgerResult<T> {
        f(&self.state.read())
    }

    fn write<T>(
        &self,
        sender: Address,
        f: impl FnOnce(&mut ChainState, &CallContext, &dyn Prover) -> HandlerResult<T>,
    ) -> LedgerResult<T> {
        let mut state = self.state.write();
        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Err(LedgerError::WriteConflict(format!(
                "nonce too low for {}",
                format_address(&sender)
            )));
        }
        let ctx = CallContext {
            sender,
            block_number: state.block_number,
        };
        let result = f(&mut state, &ctx, self.verifier.as_ref())?;
        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(LedgerError::Transport(format!(
                "response to {} lost",
                format_address(&sender)
            )));
        }
        Ok(result)
    }
}

/// [`Ledger`] over an [`InMemoryChain`].
#[derive(Clone)]
pub struct InMemoryLedger {
    chain: InMemoryChain,
    sender: Address,
}

impl InMemoryLedger {
    pub fn chain(&self) -> &InMemoryChain {
        &self.chain
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        Ok(self.chain.block_number())
    }

    async fn deployment(&self) -> LedgerResult<Deployment> {
        self.chain.read(queries::deployment)
    }

    async fn n_comm(&self) -> LedgerResult<u32> {
        self.chain.read(queries::n_comm)
    }

    async fn threshold(&self) -> LedgerResult<u32> {
        self.chain.read(queries::threshold)
    }

    async fn member_id(&self, address: Address) -> LedgerResult<MemberId> {
        self.chain.read(|s| queries::member_id(s, &address))
    }

    async fn round1(&self, commitments: Vec<EncodedPoint>) -> LedgerResult<()> {
        self.chain
            .write(self.sender, |s, ctx, _| handlers::handle_round1(s, ctx, &commitments))
    }

    async fn round1_complete(&self) -> LedgerResult<bool> {
        self.chain.read(queries::round1_complete)
    }

    async fn get_round1_pk_for(&self, id: MemberId) -> LedgerResult<EncodedPoint> {
        self.chain.read(|s| queries::round1_pk_for(s, id))
    }

    async fn get_round1_commitments(&self, id: MemberId) -> LedgerResult<Vec<EncodedPoint>> {
        self.chain.read(|s| queries::round1_commitments(s, id))
    }

    async fn round2(&self, submission: Round2Submission) -> LedgerResult<()> {
        self.chain.write(self.sender, |s, ctx, verifier| {
            handlers::handle_round2(s, ctx, &submission, verifier)
        })
    }

    async fn round2_share_received(
        &self,
        sender: MemberId,
        recipient: MemberId,
    ) -> LedgerResult<bool> {
        self.chain
            .read(|s| queries::round2_share_received(s, sender, recipient))
    }

    async fn round2_complete(&self) -> LedgerResult<bool> {
        self.chain.read(queries::round2_complete)
    }

    async fn pk_coefficients(&self) -> LedgerResult<Vec<EncodedPoint>> {
        self.chain.read(queries::pk_coefficients)
    }

    async fn get_pk_for(&self, id: MemberId) -> LedgerResult<EncodedPoint> {
        self.chain.read(|s| queries::pk_for(s, id))
    }

    async fn get_pk(&self) -> LedgerResult<EncodedPoint> {
        self.chain.read(queries::pk)
    }

    async fn round2_share_events(
        &self,
        recipient: MemberId,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<Round2ShareEvent>> {
        self.chain
            .read(|s| queries::round2_share_events(s, recipient, from_block, to_block))
    }

    async fn add_voter(&self, voter: Address, weight: u64) -> LedgerResult<()> {
        self.chain
            .write(self.sender, |s, ctx, _| handlers::handle_add_voter(s, ctx, voter, weight))
    }

    async fn get_voting_weight(&self, voter: Address) -> LedgerResult<u64> {
        self.chain.read(|s| queries::voting_weight(s, &voter))
    }

    async fn has_voted(&self, proposal_id: ProposalId, voter: Address) -> LedgerResult<bool> {
        self.chain.read(|s| queries::has_voted(s, proposal_id, &voter))
    }

    async fn setup_vote(&self, proposal_id: ProposalId, end_block: u64) -> LedgerResult<()> {
        self.chain.write(self.sender, |s, ctx, _| {
            handlers::handle_setup_vote(s, ctx, proposal_id, end_block)
        })
    }

    async fn setup_vote_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<SetupVoteEvent>> {
        self.chain
            .read(|s| queries::setup_vote_events(s, from_block, to_block))
    }

    async fn vote(
        &self,
        proposal_id: ProposalId,
        ballot: EncodedBallot,
        proof: Proof,
    ) -> LedgerResult<()> {
        self.chain.write(self.sender, |s, ctx, verifier| {
            handlers::handle_vote(s, ctx, proposal_id, &ballot, &proof, verifier)
        })
    }

    async fn get_r(&self, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]> {
        self.chain.read(|s| queries::r(s, proposal_id))
    }

    async fn get_m(&self, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]> {
        self.chain.read(|s| queries::m(s, proposal_id))
    }

    async fn voting_weight_used(&self, proposal_id: ProposalId) -> LedgerResult<u64> {
        self.chain.read(|s| queries::voting_weight_used(s, proposal_id))
    }

    async fn tally(
        &self,
        proposal_id: ProposalId,
        d: [EncodedPoint; VOTE_OPTIONS],
        proof: Proof,
    ) -> LedgerResult<()> {
        self.chain
            .write(self.sender, |s, ctx, verifier| {
                handlers::handle_tally(s, ctx, proposal_id, &d, &proof, verifier)
            })
            .map(|_| ())
    }

    async fn is_tally_complete(&self, proposal_id: ProposalId) -> LedgerResult<bool> {
        self.chain.read(|s| queries::is_tally_complete(s, proposal_id))
    }

    async fn tally_complete_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<TallyCompleteEvent>> {
        self.chain
            .read(|s| queries::tally_complete_events(s, from_block, to_block))
    }

    async fn get_vote_totals(&self, proposal_id: ProposalId) -> LedgerResult<VoteTotals> {
        self.chain.read(|s| queries::vote_totals(s, proposal_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkvote_prover::SigmaProver;

    fn chain() -> InMemoryChain {
        InMemoryChain::new(Arc::new(SigmaProver::new()))
    }

    #[tokio::test]
    async fn test_deploy_and_read_parameters() {
        let chain = chain();
        let deployment = chain.deploy(vec![[1u8; 32], [2u8; 32], [3u8; 32]], 2, 100).unwrap();
        assert_eq!(deployment.dkg.n_comm, 3);
        assert_eq!(deployment.dkg.threshold, 2);
        assert_eq!(deployment.voting.block_number_before_deploy, 0);

        let ledger = chain.connect([2u8; 32]);
        assert_eq!(ledger.n_comm().await.unwrap(), 3);
        assert_eq!(ledger.member_id([2u8; 32]).await.unwrap(), 2);
        assert_eq!(ledger.deployment().await.unwrap(), deployment);
        assert!(!ledger.round1_complete().await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_conflicts_reject_writes_only() {
        let chain = chain();
        chain.deploy(vec![[1u8; 32]], 1, 100).unwrap();
        let ledger = chain.connect([9u8; 32]);

        chain.inject_write_conflicts(1);
        let head = ledger.block_number().await.unwrap();
        let err = ledger.setup_vote(1, head + 5).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.block_number().await.unwrap(), head);

        ledger.setup_vote(1, head + 5).await.unwrap();
        let events = ledger.setup_vote_events(0, u64::MAX).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end_block, head + 5);
    }

    #[tokio::test]
    async fn test_lost_response_still_applies_write() {
        let chain = chain();
        chain.deploy(vec![[1u8; 32]], 1, 100).unwrap();
        let ledger = chain.connect([9u8; 32]);

        chain.inject_lost_responses(1);
        let head = ledger.block_number().await.unwrap();
        let err = ledger.setup_vote(1, head + 5).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.block_number().await.unwrap(), head + 1);
        assert_eq!(
            ledger.setup_vote(1, head + 5).await,
            Err(LedgerError::ProposalExists(1))
        );
    }

    #[tokio::test]
    async fn test_advance_blocks() {
        let chain = chain();
        assert_eq!(chain.advance_blocks(3), 3);
        assert_eq!(chain.connect([0u8; 32]).block_number().await.unwrap(), 3);
    }
}
