//! End-to-end integration tests for the threshold voting system.
//!
//! These tests exercise the full lifecycle:
//! 1. Committee DKG with signer-derived round-1 secrets
//! 2. Proposal setup and encrypted weighted voting
//! 3. Threshold tally driven by the orchestrator
//! 4. Recovery, retries and the JSON-RPC ledger

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use futures::future::try_join_all;
use rand::rngs::OsRng;

use zkvote_client::{cast_vote, wait_for_tally, VoteError};
use zkvote_committee::{
    member_address, Orchestrator, OrchestratorConfig, TallyEngine, TallyOutcome,
};
use zkvote_crypto::threshold::combine_scalar_shares;
use zkvote_crypto::{Point, Scalar};
use zkvote_dkg::{CommitteeMember, DkgConfig, DkgError, DkgParticipant};
use zkvote_ledger::{InMemoryChain, Ledger, LedgerError, PollPolicy, RetryPolicy, RpcLedger};
use zkvote_prover::{Prover, SigmaProver};
use zkvote_types::{Address, ProposalId, VoteChoice};

const ADMIN: Address = [0xAA; 32];

fn quick_retry() -> RetryPolicy {
    RetryPolicy::fixed(10, Duration::from_millis(1))
}

fn quick_poll() -> PollPolicy {
    PollPolicy::quorum()
        .with_interval(Duration::from_millis(5))
        .with_max_polls(4_000)
}

fn voter(i: u8) -> Address {
    [0x10 + i; 32]
}

struct Deployed {
    chain: InMemoryChain,
    prover: Arc<dyn Prover>,
    keys: Vec<SigningKey>,
}

fn deploy(n: usize, t: u32) -> Deployed {
    let prover: Arc<dyn Prover> = Arc::new(SigmaProver::new());
    let chain = InMemoryChain::new(prover.clone());
    let keys: Vec<SigningKey> = (0..n).map(|_| SigningKey::generate(&mut OsRng)).collect();
    chain
        .deploy(keys.iter().map(member_address).collect(), t, 1_000)
        .unwrap();
    Deployed { chain, prover, keys }
}

async fn join_committee<L: Ledger>(
    ledger: L,
    prover: Arc<dyn Prover>,
    key: &SigningKey,
) -> Result<CommitteeMember, DkgError> {
    let config = DkgConfig::from_ledger(&ledger).await?;
    DkgParticipant::from_signer(config, ledger, prover, key)?
        .with_policies(quick_retry(), quick_poll())
        .run()
        .await
}

impl Deployed {
    async fn run_dkg(&self) -> Vec<CommitteeMember> {
        let runs = self
            .keys
            .iter()
            .map(|key| join_committee(self.chain.connect(member_address(key)), self.prover.clone(), key));
        try_join_all(runs).await.unwrap()
    }

    fn engine(&self, member: &CommitteeMember) -> TallyEngine<zkvote_ledger::InMemoryLedger> {
        let key = &self.keys[(member.member_id - 1) as usize];
        TallyEngine::new(
            self.chain.connect(member_address(key)),
            self.prover.clone(),
            member.clone(),
        )
        .with_retry(quick_retry())
    }

    async fn open_proposal(&self, proposal_id: ProposalId, duration: u64) -> u64 {
        let end_block = self.chain.block_number() + duration;
        self.chain
            .connect(ADMIN)
            .setup_vote(proposal_id, end_block)
            .await
            .unwrap();
        end_block
    }

    async fn vote(&self, who: Address, weight: u64, proposal_id: ProposalId, choice: VoteChoice) {
        let admin = self.chain.connect(ADMIN);
        if admin.get_voting_weight(who).await.unwrap() == 0 {
            admin.add_voter(who, weight).await.unwrap();
        }
        cast_vote(
            &self.chain.connect(who),
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

fn reconstruct_secret(members: &[&CommitteeMember]) -> Scalar {
    let shares: Vec<(u32, Scalar)> = members
        .iter()
        .map(|m| (m.member_id, *m.secret_share()))
        .collect();
    combine_scalar_shares(&shares, members.len()).unwrap()
}

/// Test the complete voting flow against the in-memory ledger.
#[tokio::test]
async fn test_full_voting_flow() {
    // ========================================
    // Phase 1: DKG
    // ========================================

    let deployed = deploy(3, 2);
    let members = deployed.run_dkg().await;
    let reader = deployed.chain.connect([0xEE; 32]);

    let pk = members[0].public_key;
    assert!(members.iter().all(|m| m.public_key == pk));
    assert_eq!(Point::decode(&reader.get_pk().await.unwrap()).unwrap(), pk);
    for (i, member) in members.iter().enumerate() {
        assert_eq!(member.member_id, i as u32 + 1);
        assert_eq!(Point::from_scalar(member.secret_share()), member.public_share);
    }
    // Any two shares interpolate to the committee secret.
    let sk = reconstruct_secret(&[&members[0], &members[2]]);
    assert_eq!(Point::from_scalar(&sk), pk);
    assert_eq!(reconstruct_secret(&[&members[1], &members[2]]), sk);

    println!("DKG complete: 3 members, threshold 2");

    // ========================================
    // Phase 2: Voting
    // ========================================

    let end_block = deployed.open_proposal(1, 50).await;
    deployed.vote(voter(1), 5, 1, VoteChoice::Yay).await;
    deployed.vote(voter(2), 3, 1, VoteChoice::Nay).await;
    deployed.vote(voter(3), 1, 1, VoteChoice::Abstain).await;
    assert_eq!(reader.voting_weight_used(1).await.unwrap(), 9);
    assert!(reader.has_voted(1, voter(2)).await.unwrap());

    println!("3 votes cast on proposal 1");

    // ========================================
    // Phase 3: Tally
    // ========================================

    let start_block = reader.deployment().await.unwrap().voting.block_number_before_deploy;
    let config = OrchestratorConfig {
        start_block,
        ..OrchestratorConfig::default()
    };
    let mut first = Orchestrator::new(deployed.engine(&members[0]), config.clone());
    let mut second = Orchestrator::new(deployed.engine(&members[1]), config);

    assert!(first.tick().await.unwrap().completed.is_empty());
    deployed.chain.advance_blocks(end_block);

    assert_eq!(first.tick().await.unwrap().completed, vec![(1, TallyOutcome::Submitted)]);
    assert_eq!(second.tick().await.unwrap().completed, vec![(1, TallyOutcome::Submitted)]);
    assert_eq!(
        deployed.engine(&members[2]).tally(1).await.unwrap(),
        TallyOutcome::AlreadyComplete
    );

    let totals = wait_for_tally(&reader, 1, &quick_poll()).await.unwrap();
    assert_eq!(totals, [1, 3, 5]);
    let head = reader.block_number().await.unwrap();
    let events = reader.tally_complete_events(0, head).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].totals, [1, 3, 5]);

    println!("Tally complete: abstain 1, nay 3, yay 5");
}

#[tokio::test]
async fn test_ballot_is_one_hot() {
    let deployed = deploy(3, 2);
    let members = deployed.run_dkg().await;
    let sk = reconstruct_secret(&[&members[0], &members[1]]);

    deployed.open_proposal(2, 20).await;
    let who = voter(7);
    deployed.chain.connect(ADMIN).add_voter(who, 5).await.unwrap();
    let ballot = cast_vote(
        &deployed.chain.connect(who),
        deployed.prover.as_ref(),
        2,
        VoteChoice::Yay,
        &quick_retry(),
        &mut OsRng,
    )
    .await
    .unwrap();

    for choice in VoteChoice::ALL {
        let k = choice.index();
        let r = Point::decode(&ballot.r[k]).unwrap();
        let m = Point::decode(&ballot.m[k]).unwrap();
        let expected = if choice == VoteChoice::Yay {
            Point::from_scalar(&Scalar::from_u64(5))
        } else {
            Point::identity()
        };
        assert_eq!(m - r.scalar_mul(&sk), expected);
    }
}

#[tokio::test]
async fn test_round1_is_idempotent() {
    let deployed = deploy(2, 1);
    let key = &deployed.keys[0];
    let ledger = deployed.chain.connect(member_address(key));
    let config = DkgConfig::from_ledger(&ledger).await.unwrap();
    let mut participant = DkgParticipant::from_signer(config, ledger, deployed.prover.clone(), key)
        .unwrap()
        .with_policies(quick_retry(), quick_poll());

    participant.round1().await.unwrap();
    let head = deployed.chain.block_number();
    participant.round1().await.unwrap();
    assert_eq!(deployed.chain.block_number(), head);
}

#[tokio::test]
async fn test_tally_idempotence() {
    let deployed = deploy(3, 2);
    let members = deployed.run_dkg().await;
    let end_block = deployed.open_proposal(4, 10).await;
    deployed.vote(voter(1), 2, 4, VoteChoice::Nay).await;
    deployed.chain.advance_blocks(end_block);

    let first = deployed.engine(&members[0]);
    assert_eq!(first.tally(4).await.unwrap(), TallyOutcome::Submitted);
    assert_eq!(first.tally(4).await.unwrap(), TallyOutcome::AlreadySubmitted);
    assert_eq!(
        deployed.engine(&members[1]).tally(4).await.unwrap(),
        TallyOutcome::Submitted
    );
    assert_eq!(first.tally(4).await.unwrap(), TallyOutcome::AlreadyComplete);

    // A late member submits nothing once the threshold is met.
    let before = deployed.chain.block_number();
    assert_eq!(
        deployed.engine(&members[2]).tally(4).await.unwrap(),
        TallyOutcome::AlreadyComplete
    );
    assert_eq!(deployed.chain.block_number(), before);

    let reader = deployed.chain.connect([0xEE; 32]);
    assert_eq!(reader.get_vote_totals(4).await.unwrap(), [0, 2, 0]);
    let head = deployed.chain.block_number();
    assert_eq!(reader.tally_complete_events(0, head).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_vote_after_deadline_rejected() {
    let deployed = deploy(2, 1);
    deployed.run_dkg().await;
    let end_block = deployed.open_proposal(5, 3).await;
    deployed.chain.connect(ADMIN).add_voter(voter(1), 1).await.unwrap();
    deployed.chain.advance_blocks(end_block);

    let err = cast_vote(
        &deployed.chain.connect(voter(1)),
        deployed.prover.as_ref(),
        5,
        VoteChoice::Yay,
        &quick_retry(),
        &mut OsRng,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        VoteError::Ledger {
            source: LedgerError::VotingClosed(5),
            ..
        }
    ));
}

#[tokio::test]
async fn test_recovery_after_restart() {
    let deployed = deploy(3, 2);
    let members = deployed.run_dkg().await;

    // Member 2 loses its state and rebuilds the share from the ledger.
    let key = &deployed.keys[1];
    let ledger = deployed.chain.connect(member_address(key));
    let config = DkgConfig::from_ledger(&ledger).await.unwrap();
    let recovered = DkgParticipant::from_signer(config, ledger, deployed.prover.clone(), key)
        .unwrap()
        .with_policies(quick_retry(), quick_poll())
        .recover()
        .await
        .unwrap();
    assert_eq!(recovered.member_id, 2);
    assert_eq!(recovered.secret_share(), members[1].secret_share());
    assert_eq!(recovered.public_key, members[1].public_key);

    let end_block = deployed.open_proposal(6, 10).await;
    deployed.vote(voter(1), 7, 6, VoteChoice::Yay).await;
    deployed.chain.advance_blocks(end_block);

    assert_eq!(
        deployed.engine(&recovered).tally(6).await.unwrap(),
        TallyOutcome::Submitted
    );
    assert_eq!(
        deployed.engine(&members[2]).tally(6).await.unwrap(),
        TallyOutcome::Submitted
    );
    let reader = deployed.chain.connect([0xEE; 32]);
    assert_eq!(reader.get_vote_totals(6).await.unwrap(), [0, 0, 7]);
}

#[tokio::test]
async fn test_retry_absorbs_write_conflicts() {
    let deployed = deploy(2, 2);

    deployed.chain.inject_write_conflicts(6);
    let members = deployed.run_dkg().await;
    assert_eq!(members[0].public_key, members[1].public_key);

    deployed.open_proposal(7, 20).await;
    let admin = deployed.chain.connect(ADMIN);
    admin.add_voter(voter(1), 4).await.unwrap();
    deployed.chain.inject_write_conflicts(3);
    cast_vote(
        &deployed.chain.connect(voter(1)),
        deployed.prover.as_ref(),
        7,
        VoteChoice::Abstain,
        &quick_retry(),
        &mut OsRng,
    )
    .await
    .unwrap();
    assert_eq!(admin.voting_weight_used(7).await.unwrap(), 4);

    // A budget smaller than the conflicts surfaces the last error.
    deployed.chain.inject_write_conflicts(3);
    let err = RetryPolicy::fixed(2, Duration::from_millis(1))
        .execute("add_voter", || admin.add_voter(voter(2), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WriteConflict(_)));
    assert_eq!(admin.get_voting_weight(voter(2)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_lost_vote_response_counts_once() {
    let deployed = deploy(2, 1);
    deployed.run_dkg().await;
    deployed.open_proposal(8, 20).await;
    let admin = deployed.chain.connect(ADMIN);
    admin.add_voter(voter(1), 3).await.unwrap();

    // The ballot lands but its response is dropped; the retry then hits
    // AlreadyVoted, which the ledger confirms as our own inclusion.
    deployed.chain.inject_lost_responses(1);
    let before = deployed.chain.block_number();
    cast_vote(
        &deployed.chain.connect(voter(1)),
        deployed.prover.as_ref(),
        8,
        VoteChoice::Yay,
        &quick_retry(),
        &mut OsRng,
    )
    .await
    .unwrap();
    assert_eq!(deployed.chain.block_number(), before + 1);
    assert_eq!(admin.voting_weight_used(8).await.unwrap(), 3);
    assert!(admin.has_voted(8, voter(1)).await.unwrap());

    // A genuine second vote is still refused before submission.
    let err = cast_vote(
        &deployed.chain.connect(voter(1)),
        deployed.prover.as_ref(),
        8,
        VoteChoice::Nay,
        &quick_retry(),
        &mut OsRng,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VoteError::AlreadyVoted(8)));
}

/// The same flow with every member and voter talking to a JSON-RPC ledger.
#[tokio::test]
async fn test_voting_over_rpc() {
    let deployed = deploy(2, 2);
    let (addr, _handle) = mock_chain::start_server(deployed.chain.clone(), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let url = format!("http://{}", addr);
    let connect = |address: Address| RpcLedger::connect(&url, address).unwrap();

    let runs = deployed
        .keys
        .iter()
        .map(|key| join_committee(connect(member_address(key)), deployed.prover.clone(), key));
    let members = try_join_all(runs).await.unwrap();

    let admin = connect(ADMIN);
    let end_block = admin.block_number().await.unwrap() + 20;
    admin.setup_vote(9, end_block).await.unwrap();
    admin.add_voter(voter(1), 4).await.unwrap();
    cast_vote(
        &connect(voter(1)),
        deployed.prover.as_ref(),
        9,
        VoteChoice::Nay,
        &quick_retry(),
        &mut OsRng,
    )
    .await
    .unwrap();
    admin.advance_blocks(20).await.unwrap();

    for member in &members {
        let key = &deployed.keys[(member.member_id - 1) as usize];
        let engine = TallyEngine::new(
            connect(member_address(key)),
            deployed.prover.clone(),
            member.clone(),
        );
        assert_eq!(engine.tally(9).await.unwrap(), TallyOutcome::Submitted);
    }

    let totals = wait_for_tally(&admin, 9, &quick_poll()).await.unwrap();
    assert_eq!(totals, [0, 4, 0]);
}
