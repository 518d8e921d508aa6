//! Fixtures for the committee's unit tests: a deployed in-memory chain with
//! a completed DKG.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use rand::rngs::OsRng;

use zkvote_client::cast_vote;
use zkvote_dkg::{CommitteeMember, DkgConfig, DkgParticipant};
use zkvote_ledger::{InMemoryChain, InMemoryLedger, Ledger, PollPolicy, RetryPolicy};
use zkvote_prover::{Prover, SigmaProver};
use zkvote_types::{Address, MemberId, ProposalId, VoteChoice};

use crate::tally::TallyEngine;

pub(crate) const ADMIN: Address = [0xAA; 32];

pub(crate) fn quick_retry() -> RetryPolicy {
    RetryPolicy::fixed(10, Duration::from_millis(1))
}

pub(crate) fn quick_poll() -> PollPolicy {
    PollPolicy::quorum()
        .with_interval(Duration::from_millis(5))
        .with_max_polls(2_000)
}

pub(crate) fn member_address(id: MemberId) -> Address {
    [id as u8; 32]
}

pub(crate) fn voter_address(voter: u8) -> Address {
    [0x80 | voter; 32]
}

pub(crate) struct Fixture {
    pub chain: InMemoryChain,
    pub prover: Arc<dyn Prover>,
    pub members: Vec<CommitteeMember>,
}

impl Fixture {
    pub async fn new(n: u32, t: u32) -> Self {
        let prover: Arc<dyn Prover> = Arc::new(SigmaProver::new());
        let chain = InMemoryChain::new(prover.clone());
        chain
            .deploy((1..=n).map(member_address).collect(), t, 100)
            .unwrap();
        let participants = (1..=n).map(|id| {
            DkgParticipant::initialize(
                DkgConfig::new(n, t, id).unwrap(),
                chain.connect(member_address(id)),
                prover.clone(),
            )
            .with_policies(quick_retry(), quick_poll())
            .run()
        });
        let members = try_join_all(participants).await.unwrap();
        Self {
            chain,
            prover,
            members,
        }
    }

    pub fn engine(&self, id: MemberId) -> TallyEngine<InMemoryLedger> {
        TallyEngine::new(
            self.chain.connect(member_address(id)),
            self.prover.clone(),
            self.members[(id - 1) as usize].clone(),
        )
        .with_retry(quick_retry())
    }

    /// Open a proposal for `duration` blocks, returning its end block.
    pub async fn open_proposal(&self, proposal_id: ProposalId, duration: u64) -> u64 {
        let admin = self.chain.connect(ADMIN);
        let end_block = self.chain.block_number() + duration;
        admin.setup_vote(proposal_id, end_block).await.unwrap();
        end_block
    }

    /// Register `voter` with `weight` and cast a ballot.
    pub async fn vote(&self, voter: u8, weight: u64, proposal_id: ProposalId, choice: VoteChoice) {
        let address = voter_address(voter);
        let admin = self.chain.connect(ADMIN);
        if admin.get_voting_weight(address).await.unwrap() == 0 {
            admin.add_voter(address, weight).await.unwrap();
        }
        cast_vote(
            &self.chain.connect(address),
            self.prover.as_ref(),
            proposal_id,
            choice,
            &quick_retry(),
            &mut OsRng,
        )
        .await
        .unwrap();
    }
}
