//! Read-only access to contract state.

use zkvote_crypto::encode_points;
use zkvote_types::{
    format_address, Address, Deployment, EncodedPoint, MemberId, ProposalId, Round2ShareEvent,
    SetupVoteEvent, TallyCompleteEvent, VoteTotals, VOTE_OPTIONS,
};

use crate::error::{LedgerError, LedgerResult};
use crate::state::{ChainState, DkgContract, Proposal, VotingContract};

fn dkg(state: &ChainState) -> LedgerResult<&DkgContract> {
    state.dkg.as_ref().ok_or(LedgerError::NotDeployed)
}

fn voting(state: &ChainState) -> LedgerResult<&VotingContract> {
    state.voting.as_ref().ok_or(LedgerError::NotDeployed)
}

fn proposal(state: &ChainState, proposal_id: ProposalId) -> LedgerResult<&Proposal> {
    voting(state)?
        .proposals
        .get(&proposal_id)
        .ok_or(LedgerError::ProposalNotFound(proposal_id))
}

fn encode_triple(points: &[zkvote_crypto::Point; VOTE_OPTIONS]) -> [EncodedPoint; VOTE_OPTIONS] {
    [points[0].encode(), points[1].encode(), points[2].encode()]
}

pub fn deployment(state: &ChainState) -> LedgerResult<Deployment> {
    Ok(Deployment {
        dkg: dkg(state)?.descriptor(),
        voting: voting(state)?.descriptor(),
    })
}

// === DKG contract ===

pub fn n_comm(state: &ChainState) -> LedgerResult<u32> {
    Ok(dkg(state)?.n_comm())
}

pub fn threshold(state: &ChainState) -> LedgerResult<u32> {
    Ok(dkg(state)?.threshold)
}

pub fn member_id(state: &ChainState, address: &Address) -> LedgerResult<MemberId> {
    dkg(state)?
        .member_id(address)
        .ok_or_else(|| LedgerError::NotCommitteeMember(format_address(address)))
}

pub fn round1_complete(state: &ChainState) -> LedgerResult<bool> {
    Ok(dkg(state)?.round1_complete())
}

pub fn round1_pk_for(state: &ChainState, id: MemberId) -> LedgerResult<EncodedPoint> {
    let dkg = dkg(state)?;
    if !dkg.is_valid_id(id) {
        return Err(LedgerError::InvalidMemberId(id));
    }
    dkg.round1_pk_for(id)
        .map(|p| p.encode())
        .ok_or(LedgerError::Round1NotPosted(id))
}

pub fn round1_commitments(state: &ChainState, id: MemberId) -> LedgerResult<Vec<EncodedPoint>> {
    let dkg = dkg(state)?;
    if !dkg.is_valid_id(id) {
        return Err(LedgerError::InvalidMemberId(id));
    }
    dkg.round1
        .get(&id)
        .map(|c| encode_points(c))
        .ok_or(LedgerError::Round1NotPosted(id))
}

pub fn round2_share_received(
    state: &ChainState,
    sender: MemberId,
    recipient: MemberId,
) -> LedgerResult<bool> {
    Ok(dkg(state)?.round2.contains_key(&(sender, recipient)))
}

pub fn round2_complete(state: &ChainState) -> LedgerResult<bool> {
    Ok(dkg(state)?.round2_complete())
}

pub fn pk_coefficients(state: &ChainState) -> LedgerResult<Vec<EncodedPoint>> {
    dkg(state)?
        .pk_coefficients()
        .map(|c| encode_points(&c))
        .ok_or(LedgerError::Round1Incomplete)
}

pub fn pk_for(state: &ChainState, id: MemberId) -> LedgerResult<EncodedPoint> {
    let dkg = dkg(state)?;
    if !dkg.is_valid_id(id) {
        return Err(LedgerError::InvalidMemberId(id));
    }
    dkg.pk_for(id)
        .map(|p| p.encode())
        .ok_or(LedgerError::Round2Incomplete)
}

pub fn pk(state: &ChainState) -> LedgerResult<EncodedPoint> {
    dkg(state)?
        .pk()
        .map(|p| p.encode())
        .ok_or(LedgerError::Round1Incomplete)
}

pub fn round2_share_events(
    state: &ChainState,
    recipient: MemberId,
    from_block: u64,
    to_block: u64,
) -> LedgerResult<Vec<Round2ShareEvent>> {
    dkg(state)?;
    Ok(state.events.round2_shares_for(recipient, from_block, to_block))
}

// === Voting contract ===

pub fn voting_weight(state: &ChainState, voter: &Address) -> LedgerResult<u64> {
    Ok(voting(state)?.voting_weight(voter))
}

pub fn has_voted(state: &ChainState, proposal_id: ProposalId, voter: &Address) -> LedgerResult<bool> {
    Ok(proposal(state, proposal_id)?.voted.contains(voter))
}

pub fn setup_vote_events(
    state: &ChainState,
    from_block: u64,
    to_block: u64,
) -> LedgerResult<Vec<SetupVoteEvent>> {
    voting(state)?;
    Ok(state.events.setup_votes_between(from_block, to_block))
}

pub fn r(state: &ChainState, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]> {
    Ok(encode_triple(&proposal(state, proposal_id)?.r_sum))
}

pub fn m(state: &ChainState, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]> {
    Ok(encode_triple(&proposal(state, proposal_id)?.m_sum))
}

pub fn voting_weight_used(state: &ChainState, proposal_id: ProposalId) -> LedgerResult<u64> {
    Ok(proposal(state, proposal_id)?.weight_used)
}

pub fn is_tally_complete(state: &ChainState, proposal_id: ProposalId) -> LedgerResult<bool> {
    Ok(proposal(state, proposal_id)?.totals.is_some())
}

pub fn tally_complete_events(
    state: &ChainState,
    from_block: u64,
    to_block: u64,
) -> LedgerResult<Vec<TallyCompleteEvent>> {
    voting(state)?;
    Ok(state.events.tally_complete_between(from_block, to_block))
}

/// Totals in `Abstain, Nay, Yay` order; all zero until the tally completes.
pub fn vote_totals(state: &ChainState, proposal_id: ProposalId) -> LedgerResult<VoteTotals> {
    Ok(proposal(state, proposal_id)?.totals.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_before_deploy() {
        let state = ChainState::new();
        assert_eq!(n_comm(&state), Err(LedgerError::NotDeployed));
        assert_eq!(vote_totals(&state, 1), Err(LedgerError::NotDeployed));
    }

    #[test]
    fn test_unknown_proposal() {
        let (state, _) = crate::testing::Committee::deployed(2, 1);
        assert_eq!(voting_weight_used(&state, 9), Err(LedgerError::ProposalNotFound(9)));
        assert_eq!(round1_pk_for(&state, 3), Err(LedgerError::InvalidMemberId(3)));
        assert_eq!(round1_pk_for(&state, 2), Err(LedgerError::Round1NotPosted(2)));
        assert_eq!(round1_commitments(&state, 0), Err(LedgerError::InvalidMemberId(0)));
        assert_eq!(round1_commitments(&state, 1), Err(LedgerError::Round1NotPosted(1)));
        assert_eq!(pk(&state), Err(LedgerError::Round1Incomplete));
    }

    #[test]
    fn test_round1_commitments_as_posted() {
        let (mut state, committee) = crate::testing::Committee::deployed(2, 2);
        committee.post_round1(&mut state);
        assert_eq!(round1_commitments(&state, 2), Ok(committee.commitments(2)));
        assert_eq!(round1_pk_for(&state, 2), Ok(committee.commitments(2)[0].clone()));
    }
}
