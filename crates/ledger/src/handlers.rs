//! Call handlers for the DKG and voting contracts.
//!
//! Handlers validate everything before touching state, so a rejected call
//! leaves the chain unchanged. Each accepted call is mined into a new block.

use tracing::{debug, info};

use zkvote_crypto::curve::decode_field;
use zkvote_crypto::{
    combine_partial_decryptions, decode_points, recover_discrete_log, BaseField, Point,
};
use zkvote_prover::{
    verify_statement, Circuit, NvoteStatement, Prover, Round2Statement, Statement,
    TallyStatement, VerificationKey,
};
use zkvote_types::{
    compute_address, format_address, Address, Deployment, EncodedBallot, EncodedPoint, MemberId,
    Proof, ProposalId, Round2ShareEvent, Round2Submission, SetupVoteEvent, TallyCompleteEvent,
    VoteTotals, VOTE_OPTIONS,
};

use crate::error::LedgerError;
use crate::state::{
    ChainState, DkgContract, Proposal, ProposalStatus, StoredShare, VotingContract,
};

/// Context provided by the chain for each call.
pub struct CallContext {
    /// Sender of the transaction
    pub sender: Address,
    /// Chain head when the call is executed
    pub block_number: u64,
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, LedgerError>;

fn dkg_ref(state: &ChainState) -> HandlerResult<&DkgContract> {
    state.dkg.as_ref().ok_or(LedgerError::NotDeployed)
}

fn dkg_mut(state: &mut ChainState) -> HandlerResult<&mut DkgContract> {
    state.dkg.as_mut().ok_or(LedgerError::NotDeployed)
}

fn voting_ref(state: &ChainState) -> HandlerResult<&VotingContract> {
    state.voting.as_ref().ok_or(LedgerError::NotDeployed)
}

fn voting_mut(state: &mut ChainState) -> HandlerResult<&mut VotingContract> {
    state.voting.as_mut().ok_or(LedgerError::NotDeployed)
}

fn proposal_mut(state: &mut ChainState, proposal_id: ProposalId) -> HandlerResult<&mut Proposal> {
    voting_mut(state)?
        .proposals
        .get_mut(&proposal_id)
        .ok_or(LedgerError::ProposalNotFound(proposal_id))
}

fn sender_id(dkg: &DkgContract, ctx: &CallContext) -> HandlerResult<MemberId> {
    dkg.member_id(&ctx.sender)
        .ok_or_else(|| LedgerError::NotCommitteeMember(format_address(&ctx.sender)))
}

fn decode_triple(points: &[EncodedPoint; VOTE_OPTIONS]) -> HandlerResult<[Point; VOTE_OPTIONS]> {
    Ok([
        Point::decode(&points[0])?,
        Point::decode(&points[1])?,
        Point::decode(&points[2])?,
    ])
}

fn check_proof<S: Statement>(
    verifier: &dyn Prover,
    key: &VerificationKey,
    statement: &S,
    proof: &Proof,
) -> HandlerResult<()> {
    match verify_statement(verifier, key, statement, proof) {
        Ok(true) => Ok(()),
        _ => {
            debug!(circuit = %S::CIRCUIT, "proof rejected");
            Err(LedgerError::InvalidProof(S::CIRCUIT))
        }
    }
}

fn contract_address(kind: &str, block: u64) -> Address {
    compute_address(format!("zkvote-{}-contract/{}", kind, block).as_bytes())
}

/// Deploy the DKG and voting contracts.
pub fn handle_deploy(
    state: &mut ChainState,
    _ctx: &CallContext,
    committee: Vec<Address>,
    threshold: u32,
    max_total_voting_weight: u64,
    verifier: &dyn Prover,
) -> HandlerResult<Deployment> {
    if state.dkg.is_some() || state.voting.is_some() {
        return Err(LedgerError::AlreadyDeployed);
    }
    if committee.is_empty() {
        return Err(LedgerError::InvalidDeployment("empty committee".into()));
    }
    if threshold == 0 || threshold as usize > committee.len() {
        return Err(LedgerError::InvalidDeployment(format!(
            "threshold {} outside 1..={}",
            threshold,
            committee.len()
        )));
    }
    for (i, a) in committee.iter().enumerate() {
        if committee[..i].contains(a) {
            return Err(LedgerError::InvalidDeployment(format!(
                "duplicate committee member {}",
                format_address(a)
            )));
        }
    }

    let block = state.mine();
    let dkg = DkgContract {
        address: contract_address("dkg", block),
        committee,
        threshold,
        round1: Default::default(),
        round2: Default::default(),
        round2_vk: verifier.verification_key(Circuit::Round2),
    };
    let voting = VotingContract {
        address: contract_address("voting", block),
        deploy_block: block,
        max_total_voting_weight,
        voters: Default::default(),
        proposals: Default::default(),
        nvote_vk: verifier.verification_key(Circuit::Nvote),
        tally_vk: verifier.verification_key(Circuit::Tally),
    };
    let deployment = Deployment {
        dkg: dkg.descriptor(),
        voting: voting.descriptor(),
    };
    state.dkg = Some(dkg);
    state.voting = Some(voting);

    info!(
        block,
        n_comm = deployment.dkg.n_comm,
        threshold,
        max_total_voting_weight,
        "contracts deployed"
    );
    Ok(deployment)
}

/// Handle `round1(commitments)`.
///
/// Re-posting the identical vector is accepted without effect.
pub fn handle_round1(
    state: &mut ChainState,
    ctx: &CallContext,
    commitments: &[EncodedPoint],
) -> HandlerResult<()> {
    let dkg = dkg_ref(state)?;
    let member_id = sender_id(dkg, ctx)?;
    if commitments.len() != dkg.threshold as usize {
        return Err(LedgerError::InvalidCommitmentCount {
            expected: dkg.threshold as usize,
            got: commitments.len(),
        });
    }
    let points = decode_points(commitments)?;
    if let Some(existing) = dkg.round1.get(&member_id) {
        if *existing == points {
            debug!(member_id, "round 1 commitments re-posted");
            return Ok(());
        }
        return Err(LedgerError::Round1AlreadyPosted(member_id));
    }

    dkg_mut(state)?.round1.insert(member_id, points);
    let block = state.mine();
    debug!(member_id, block, "round 1 commitments stored");
    Ok(())
}

/// Handle `round2(recipient, ciphertext, ephemeralPK, shareCommitment, proof)`.
pub fn handle_round2(
    state: &mut ChainState,
    ctx: &CallContext,
    submission: &Round2Submission,
    verifier: &dyn Prover,
) -> HandlerResult<()> {
    let dkg = dkg_ref(state)?;
    let sender = sender_id(dkg, ctx)?;
    let recipient = submission.recipient_id;
    if !dkg.round1_complete() {
        return Err(LedgerError::Round1Incomplete);
    }
    if !dkg.is_valid_id(recipient) {
        return Err(LedgerError::InvalidMemberId(recipient));
    }
    if dkg.round2.contains_key(&(sender, recipient)) {
        return Err(LedgerError::Round2AlreadyPosted { sender, recipient });
    }

    let recipient_pk = dkg
        .round1_pk_for(recipient)
        .ok_or(LedgerError::Round1NotPosted(recipient))?;
    let coefficient_commitments = dkg
        .round1
        .get(&sender)
        .cloned()
        .ok_or(LedgerError::Round1NotPosted(sender))?;
    let share = StoredShare {
        ciphertext: decode_field::<BaseField>(&submission.ciphertext)?,
        ephemeral_pk: Point::decode(&submission.ephemeral_pk)?,
        share_commitment: Point::decode(&submission.share_commitment)?,
    };
    let statement = Round2Statement {
        recipient_id: recipient,
        recipient_pk,
        share_commitment: share.share_commitment,
        ciphertext: share.ciphertext,
        ephemeral_pk: share.ephemeral_pk,
        coefficient_commitments,
    };
    check_proof(verifier, &dkg.round2_vk, &statement, &submission.proof)?;

    dkg_mut(state)?.round2.insert((sender, recipient), share);
    let block = state.mine();
    state.events.round2_shares.push(Round2ShareEvent {
        block_number: block,
        recipient_id: recipient,
        sender_id: sender,
        ciphertext: submission.ciphertext.clone(),
        ephemeral_pk: submission.ephemeral_pk.clone(),
    });
    debug!(sender, recipient, block, "round 2 share stored");
    Ok(())
}

/// Handle `add_voter(voter, weight)`.
pub fn handle_add_voter(
    state: &mut ChainState,
    _ctx: &CallContext,
    voter: Address,
    weight: u64,
) -> HandlerResult<()> {
    voting_mut(state)?.voters.insert(voter, weight);
    let block = state.mine();
    debug!(voter = %format_address(&voter), weight, block, "voter registered");
    Ok(())
}

/// Handle `setupVote(proposalId, endBlock)`.
pub fn handle_setup_vote(
    state: &mut ChainState,
    ctx: &CallContext,
    proposal_id: ProposalId,
    end_block: u64,
) -> HandlerResult<()> {
    let voting = voting_ref(state)?;
    if voting.proposals.contains_key(&proposal_id) {
        return Err(LedgerError::ProposalExists(proposal_id));
    }
    if end_block <= ctx.block_number {
        return Err(LedgerError::InvalidDeadline {
            end_block,
            current: ctx.block_number,
        });
    }

    voting_mut(state)?
        .proposals
        .insert(proposal_id, Proposal::new(end_block));
    let block = state.mine();
    state.events.setup_votes.push(SetupVoteEvent {
        block_number: block,
        proposal_id,
        end_block,
    });
    info!(proposal_id, end_block, block, "vote set up");
    Ok(())
}

/// Handle `vote(proposalId, R, M, proof)`.
///
/// The voter's registered weight is the `votePower` public input.
pub fn handle_vote(
    state: &mut ChainState,
    ctx: &CallContext,
    proposal_id: ProposalId,
    ballot: &EncodedBallot,
    proof: &Proof,
    verifier: &dyn Prover,
) -> HandlerResult<()> {
    let dkg = dkg_ref(state)?;
    if !dkg.round2_complete() {
        return Err(LedgerError::Round2Incomplete);
    }
    let pk = dkg.pk().ok_or(LedgerError::Round1Incomplete)?;

    let voting = voting_ref(state)?;
    let proposal = voting
        .proposals
        .get(&proposal_id)
        .ok_or(LedgerError::ProposalNotFound(proposal_id))?;
    if proposal.status() != ProposalStatus::Open || ctx.block_number >= proposal.end_block {
        return Err(LedgerError::VotingClosed(proposal_id));
    }
    let weight = voting.voting_weight(&ctx.sender);
    if weight == 0 {
        return Err(LedgerError::NotRegistered(format_address(&ctx.sender)));
    }
    if proposal.voted.contains(&ctx.sender) {
        return Err(LedgerError::AlreadyVoted(proposal_id));
    }
    let max = voting.max_total_voting_weight;
    match proposal.weight_used.checked_add(weight) {
        Some(total) if total <= max => {}
        _ => {
            return Err(LedgerError::WeightLimitExceeded {
                used: proposal.weight_used,
                weight,
                max,
            })
        }
    }

    let statement = NvoteStatement {
        pk,
        vote_power: weight,
        r: decode_triple(&ballot.r)?,
        m: decode_triple(&ballot.m)?,
    };
    check_proof(verifier, &voting.nvote_vk, &statement, proof)?;

    let proposal = proposal_mut(state, proposal_id)?;
    for k in 0..VOTE_OPTIONS {
        proposal.r_sum[k] += statement.r[k];
        proposal.m_sum[k] += statement.m[k];
    }
    proposal.weight_used += weight;
    proposal.voted.insert(ctx.sender);
    let block = state.mine();
    debug!(proposal_id, weight, block, "ballot accepted");
    Ok(())
}

fn recover_totals(
    proposal_id: ProposalId,
    proposal: &Proposal,
    shares: &[(MemberId, [Point; VOTE_OPTIONS])],
    threshold: usize,
    max_weight: u64,
) -> HandlerResult<VoteTotals> {
    let mut totals = [0u64; VOTE_OPTIONS];
    for (k, total) in totals.iter_mut().enumerate() {
        let partials: Vec<(MemberId, Point)> = shares.iter().map(|(id, d)| (*id, d[k])).collect();
        let sk_r = combine_partial_decryptions(&partials, threshold)
            .map_err(|_| LedgerError::TallyRecoveryFailed(proposal_id))?;
        *total = recover_discrete_log(&(proposal.m_sum[k] - sk_r), max_weight)
            .map_err(|_| LedgerError::TallyRecoveryFailed(proposal_id))?;
    }
    Ok(totals)
}

/// Handle `tally(proposalId, D_i, proof)`.
///
/// The first accepted share freezes the ballots. Once `t` shares are in,
/// they are combined, the totals recorded and `TallyComplete` emitted.
/// Returns the totals when this call completed the tally.
pub fn handle_tally(
    state: &mut ChainState,
    ctx: &CallContext,
    proposal_id: ProposalId,
    d: &[EncodedPoint; VOTE_OPTIONS],
    proof: &Proof,
    verifier: &dyn Prover,
) -> HandlerResult<Option<VoteTotals>> {
    let dkg = dkg_ref(state)?;
    let member_id = sender_id(dkg, ctx)?;
    let pk_i = dkg.pk_for(member_id).ok_or(LedgerError::Round2Incomplete)?;
    let threshold = dkg.threshold as usize;

    let voting = voting_ref(state)?;
    let proposal = voting
        .proposals
        .get(&proposal_id)
        .ok_or(LedgerError::ProposalNotFound(proposal_id))?;
    if proposal.status() == ProposalStatus::Complete {
        return Err(LedgerError::TallyAlreadyComplete(proposal_id));
    }
    if proposal.has_tallied(member_id) {
        return Err(LedgerError::AlreadyTallied {
            proposal_id,
            member_id,
        });
    }

    let statement = TallyStatement {
        pk_i,
        r: proposal.r_sum,
        d: decode_triple(d)?,
    };
    check_proof(verifier, &voting.tally_vk, &statement, proof)?;

    let mut shares = proposal.tally_shares.clone();
    shares.push((member_id, statement.d));
    let totals = if shares.len() >= threshold {
        Some(recover_totals(
            proposal_id,
            proposal,
            &shares[..threshold],
            threshold,
            voting.max_total_voting_weight,
        )?)
    } else {
        None
    };

    let proposal = proposal_mut(state, proposal_id)?;
    proposal.tally_shares = shares;
    proposal.totals = totals;
    let block = state.mine();
    match totals {
        Some(totals) => {
            state.events.tally_complete.push(TallyCompleteEvent {
                block_number: block,
                proposal_id,
                totals,
            });
            info!(proposal_id, member_id, block, ?totals, "tally complete");
        }
        None => debug!(proposal_id, member_id, block, "partial decryption accepted"),
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries;
    use crate::testing::{ballot_for, Committee};
    use zkvote_types::VoteChoice;

    #[test]
    fn test_deploy_rejects_bad_threshold() {
        let mut state = ChainState::new();
        let ctx = Committee::admin_context(&state);
        let prover = zkvote_prover::SigmaProver::new();
        let result = handle_deploy(&mut state, &ctx, vec![[1u8; 32], [2u8; 32]], 3, 100, &prover);
        assert!(matches!(result, Err(LedgerError::InvalidDeployment(_))));
        let result = handle_deploy(&mut state, &ctx, vec![[1u8; 32], [1u8; 32]], 1, 100, &prover);
        assert!(matches!(result, Err(LedgerError::InvalidDeployment(_))));
        assert_eq!(state.block_number, 0);
    }

    #[test]
    fn test_round1_is_idempotent() {
        let (mut state, committee) = Committee::deployed(3, 2);
        let ctx = committee.context(&state, 1);
        let commitments = committee.commitments(1);
        handle_round1(&mut state, &ctx, &commitments).unwrap();
        let head = state.block_number;

        let ctx = committee.context(&state, 1);
        handle_round1(&mut state, &ctx, &commitments).unwrap();
        assert_eq!(state.block_number, head);

        let other = committee.commitments(2);
        assert_eq!(
            handle_round1(&mut state, &ctx, &other),
            Err(LedgerError::Round1AlreadyPosted(1))
        );
    }

    #[test]
    fn test_round1_rejects_outsider_and_wrong_length() {
        let (mut state, committee) = Committee::deployed(3, 2);
        let ctx = CallContext {
            sender: [0xee; 32],
            block_number: state.block_number,
        };
        assert!(matches!(
            handle_round1(&mut state, &ctx, &committee.commitments(1)),
            Err(LedgerError::NotCommitteeMember(_))
        ));

        let ctx = committee.context(&state, 1);
        let mut short = committee.commitments(1);
        short.pop();
        assert_eq!(
            handle_round1(&mut state, &ctx, &short),
            Err(LedgerError::InvalidCommitmentCount {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_round2_requires_round1() {
        let (mut state, committee) = Committee::deployed(2, 2);
        let ctx = committee.context(&state, 1);
        handle_round1(&mut state, &ctx, &committee.commitments(1)).unwrap();
        let submission = committee.submission(1, 2);
        let ctx = committee.context(&state, 1);
        assert_eq!(
            handle_round2(&mut state, &ctx, &submission, &committee.prover),
            Err(LedgerError::Round1Incomplete)
        );
    }

    #[test]
    fn test_round2_rejects_redirected_share() {
        let (mut state, committee) = Committee::deployed(3, 2);
        committee.post_round1(&mut state);
        let mut submission = committee.submission(1, 2);
        submission.recipient_id = 3;
        let ctx = committee.context(&state, 1);
        assert_eq!(
            handle_round2(&mut state, &ctx, &submission, &committee.prover),
            Err(LedgerError::InvalidProof(Circuit::Round2))
        );
        assert!(state.events.round2_shares.is_empty());
    }

    #[test]
    fn test_round2_rejects_duplicate() {
        let (mut state, committee) = Committee::deployed(2, 1);
        committee.post_round1(&mut state);
        let submission = committee.submission(2, 1);
        let ctx = committee.context(&state, 2);
        handle_round2(&mut state, &ctx, &submission, &committee.prover).unwrap();
        assert_eq!(
            handle_round2(&mut state, &ctx, &submission, &committee.prover),
            Err(LedgerError::Round2AlreadyPosted {
                sender: 2,
                recipient: 1
            })
        );
    }

    #[test]
    fn test_dkg_publishes_member_keys() {
        let (mut state, committee) = Committee::deployed(3, 2);
        committee.run_dkg(&mut state);

        assert!(queries::round2_complete(&state).unwrap());
        for id in 1..=3 {
            let expected = Point::from_scalar(&committee.secret_share(id)).encode();
            assert_eq!(queries::pk_for(&state, id).unwrap(), expected);
            assert_eq!(queries::round2_share_events(&state, id, 0, state.block_number).unwrap().len(), 3);
        }
        assert_eq!(queries::pk(&state).unwrap(), committee.public_key().encode());
    }

    #[test]
    fn test_vote_and_threshold_tally() {
        let (mut state, committee) = Committee::deployed(3, 2);
        committee.run_dkg(&mut state);

        let admin = Committee::admin_context(&state);
        handle_setup_vote(&mut state, &admin, 7, admin.block_number + 50).unwrap();
        let voters = [([0xa1; 32], 5u64, VoteChoice::Yay), ([0xa2; 32], 3, VoteChoice::Nay)];
        for (voter, weight, _) in &voters {
            let ctx = Committee::admin_context(&state);
            handle_add_voter(&mut state, &ctx, *voter, *weight).unwrap();
        }
        for (voter, weight, choice) in &voters {
            let (ballot, proof) = ballot_for(&committee.public_key(), *weight, *choice, &committee.prover);
            let ctx = CallContext {
                sender: *voter,
                block_number: state.block_number,
            };
            handle_vote(&mut state, &ctx, 7, &ballot, &proof, &committee.prover).unwrap();
        }
        assert_eq!(queries::voting_weight_used(&state, 7).unwrap(), 8);

        let (d, proof) = committee.partial_decryption(&state, 1, 7);
        let ctx = committee.context(&state, 1);
        assert_eq!(handle_tally(&mut state, &ctx, 7, &d, &proof, &committee.prover), Ok(None));

        // ballots are frozen once tallying starts
        let (ballot, proof) = ballot_for(&committee.public_key(), 1, VoteChoice::Abstain, &committee.prover);
        let ctx = CallContext {
            sender: [0xa3; 32],
            block_number: state.block_number,
        };
        assert_eq!(
            handle_vote(&mut state, &ctx, 7, &ballot, &proof, &committee.prover),
            Err(LedgerError::VotingClosed(7))
        );

        let (d, proof) = committee.partial_decryption(&state, 3, 7);
        let ctx = committee.context(&state, 3);
        assert_eq!(
            handle_tally(&mut state, &ctx, 7, &d, &proof, &committee.prover),
            Ok(Some([0, 3, 5]))
        );
        assert_eq!(queries::vote_totals(&state, 7).unwrap(), [0, 3, 5]);
        assert_eq!(state.events.tally_complete.len(), 1);

        let (d, proof) = committee.partial_decryption(&state, 2, 7);
        let ctx = committee.context(&state, 2);
        assert_eq!(
            handle_tally(&mut state, &ctx, 7, &d, &proof, &committee.prover),
            Err(LedgerError::TallyAlreadyComplete(7))
        );
    }

    #[test]
    fn test_vote_rejections() {
        let (mut state, committee) = Committee::deployed(2, 2);
        committee.run_dkg(&mut state);
        let admin = Committee::admin_context(&state);
        handle_setup_vote(&mut state, &admin, 1, admin.block_number + 10).unwrap();
        let voter = [0xb1; 32];
        let pk = committee.public_key();

        let (ballot, proof) = ballot_for(&pk, 4, VoteChoice::Yay, &committee.prover);
        let ctx = CallContext {
            sender: voter,
            block_number: state.block_number,
        };
        assert!(matches!(
            handle_vote(&mut state, &ctx, 1, &ballot, &proof, &committee.prover),
            Err(LedgerError::NotRegistered(_))
        ));

        let admin = Committee::admin_context(&state);
        handle_add_voter(&mut state, &admin, voter, 4).unwrap();

        // proof made for a different weight than the registered one
        let (ballot, proof) = ballot_for(&pk, 2, VoteChoice::Yay, &committee.prover);
        let ctx = CallContext {
            sender: voter,
            block_number: state.block_number,
        };
        assert_eq!(
            handle_vote(&mut state, &ctx, 1, &ballot, &proof, &committee.prover),
            Err(LedgerError::InvalidProof(Circuit::Nvote))
        );

        let (ballot, proof) = ballot_for(&pk, 4, VoteChoice::Yay, &committee.prover);
        handle_vote(&mut state, &ctx, 1, &ballot, &proof, &committee.prover).unwrap();
        let ctx = CallContext {
            sender: voter,
            block_number: state.block_number,
        };
        assert_eq!(
            handle_vote(&mut state, &ctx, 1, &ballot, &proof, &committee.prover),
            Err(LedgerError::AlreadyVoted(1))
        );

        state.advance_blocks(20);
        let late = [0xb2; 32];
        let admin = Committee::admin_context(&state);
        handle_add_voter(&mut state, &admin, late, 1).unwrap();
        let (ballot, proof) = ballot_for(&pk, 1, VoteChoice::Nay, &committee.prover);
        let ctx = CallContext {
            sender: late,
            block_number: state.block_number,
        };
        assert_eq!(
            handle_vote(&mut state, &ctx, 1, &ballot, &proof, &committee.prover),
            Err(LedgerError::VotingClosed(1))
        );
    }

    #[test]
    fn test_setup_vote_rejections() {
        let (mut state, _committee) = Committee::deployed(2, 1);
        let ctx = Committee::admin_context(&state);
        assert!(matches!(
            handle_setup_vote(&mut state, &ctx, 1, ctx.block_number),
            Err(LedgerError::InvalidDeadline { .. })
        ));
        handle_setup_vote(&mut state, &ctx, 1, ctx.block_number + 10).unwrap();
        let ctx = Committee::admin_context(&state);
        assert_eq!(
            handle_setup_vote(&mut state, &ctx, 1, ctx.block_number + 10),
            Err(LedgerError::ProposalExists(1))
        );
    }
}
