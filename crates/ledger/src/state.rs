//! Contract state held by the ledger.

use std::collections::{BTreeMap, HashMap, HashSet};

use zkvote_crypto::{BaseField, Point};
use zkvote_prover::VerificationKey;
use zkvote_types::{
    format_address, Address, DkgDescriptor, MemberId, ProposalId, Round2ShareEvent,
    SetupVoteEvent, TallyCompleteEvent, VoteTotals, VotingDescriptor, VOTE_OPTIONS,
};

/// A verified round-2 share as stored by the DKG contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredShare {
    pub ciphertext: BaseField,
    pub ephemeral_pk: Point,
    /// `f_sender(recipient)·G`
    pub share_commitment: Point,
}

/// State of the DKG contract.
#[derive(Clone, Debug)]
pub struct DkgContract {
    pub address: Address,
    /// Member `i` is `committee[i - 1]`
    pub committee: Vec<Address>,
    pub threshold: u32,
    pub round1: BTreeMap<MemberId, Vec<Point>>,
    /// Keyed by `(sender, recipient)`
    pub round2: BTreeMap<(MemberId, MemberId), StoredShare>,
    pub round2_vk: VerificationKey,
}

impl DkgContract {
    pub fn n_comm(&self) -> u32 {
        self.committee.len() as u32
    }

    pub fn member_id(&self, address: &Address) -> Option<MemberId> {
        self.committee
            .iter()
            .position(|a| a == address)
            .map(|i| i as MemberId + 1)
    }

    pub fn is_valid_id(&self, id: MemberId) -> bool {
        id >= 1 && id <= self.n_comm()
    }

    pub fn round1_complete(&self) -> bool {
        self.round1.len() as u32 == self.n_comm()
    }

    pub fn round2_complete(&self) -> bool {
        self.round2.len() as u64 == (self.n_comm() as u64) * (self.n_comm() as u64)
    }

    /// The round-2 encryption key of a member: its first coefficient commitment.
    pub fn round1_pk_for(&self, id: MemberId) -> Option<Point> {
        self.round1.get(&id).and_then(|c| c.first().copied())
    }

    /// Coefficient commitments of the joint polynomial, `Σ_i C_{i,j}`.
    pub fn pk_coefficients(&self) -> Option<Vec<Point>> {
        if !self.round1_complete() {
            return None;
        }
        let mut sums = vec![Point::identity(); self.threshold as usize];
        for commitments in self.round1.values() {
            for (sum, c) in sums.iter_mut().zip(commitments) {
                *sum += *c;
            }
        }
        Some(sums)
    }

    /// The aggregate public key `Σ_i C_{i,0}`.
    pub fn pk(&self) -> Option<Point> {
        self.pk_coefficients().and_then(|c| c.first().copied())
    }

    /// Public share of member `id`: the sum of every share commitment sent to it.
    pub fn pk_for(&self, id: MemberId) -> Option<Point> {
        let received: Vec<Point> = self
            .round2
            .iter()
            .filter(|((_, recipient), _)| *recipient == id)
            .map(|(_, share)| share.share_commitment)
            .collect();
        if received.len() as u32 != self.n_comm() {
            return None;
        }
        Some(received.into_iter().sum())
    }

    pub fn descriptor(&self) -> DkgDescriptor {
        DkgDescriptor {
            address: format_address(&self.address),
            n_comm: self.n_comm(),
            threshold: self.threshold,
        }
    }
}

/// Tally progress of a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalStatus {
    Open,
    /// At least one partial decryption accepted; ballots are frozen
    Tallying,
    Complete,
}

/// State of one proposal in the voting contract.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub end_block: u64,
    pub r_sum: [Point; VOTE_OPTIONS],
    pub m_sum: [Point; VOTE_OPTIONS],
    pub weight_used: u64,
    pub voted: HashSet<Address>,
    /// Verified partial decryptions in arrival order
    pub tally_shares: Vec<(MemberId, [Point; VOTE_OPTIONS])>,
    pub totals: Option<VoteTotals>,
}

impl Proposal {
    pub fn new(end_block: u64) -> Self {
        Self {
            end_block,
            r_sum: [Point::identity(); VOTE_OPTIONS],
            m_sum: [Point::identity(); VOTE_OPTIONS],
            weight_used: 0,
            voted: HashSet::new(),
            tally_shares: Vec::new(),
            totals: None,
        }
    }

    pub fn status(&self) -> ProposalStatus {
        if self.totals.is_some() {
            ProposalStatus::Complete
        } else if !self.tally_shares.is_empty() {
            ProposalStatus::Tallying
        } else {
            ProposalStatus::Open
        }
    }

    pub fn has_tallied(&self, member_id: MemberId) -> bool {
        self.tally_shares.iter().any(|(id, _)| *id == member_id)
    }
}

/// State of the voting contract.
#[derive(Clone, Debug)]
pub struct VotingContract {
    pub address: Address,
    pub deploy_block: u64,
    pub max_total_voting_weight: u64,
    pub voters: HashMap<Address, u64>,
    pub proposals: BTreeMap<ProposalId, Proposal>,
    pub nvote_vk: VerificationKey,
    pub tally_vk: VerificationKey,
}

impl VotingContract {
    pub fn voting_weight(&self, voter: &Address) -> u64 {
        self.voters.get(voter).copied().unwrap_or(0)
    }

    pub fn descriptor(&self) -> VotingDescriptor {
        VotingDescriptor {
            address: format_address(&self.address),
            block_number_before_deploy: self.deploy_block.saturating_sub(1),
        }
    }
}

/// Emitted events, in block order.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    pub round2_shares: Vec<Round2ShareEvent>,
    pub setup_votes: Vec<SetupVoteEvent>,
    pub tally_complete: Vec<TallyCompleteEvent>,
}

fn in_range(block: u64, from_block: u64, to_block: u64) -> bool {
    block >= from_block && block <= to_block
}

impl EventLog {
    pub fn round2_shares_for(
        &self,
        recipient: MemberId,
        from_block: u64,
        to_block: u64,
    ) -> Vec<Round2ShareEvent> {
        self.round2_shares
            .iter()
            .filter(|e| e.recipient_id == recipient && in_range(e.block_number, from_block, to_block))
            .cloned()
            .collect()
    }

    pub fn setup_votes_between(&self, from_block: u64, to_block: u64) -> Vec<SetupVoteEvent> {
        self.setup_votes
            .iter()
            .filter(|e| in_range(e.block_number, from_block, to_block))
            .cloned()
            .collect()
    }

    pub fn tally_complete_between(&self, from_block: u64, to_block: u64) -> Vec<TallyCompleteEvent> {
        self.tally_complete
            .iter()
            .filter(|e| in_range(e.block_number, from_block, to_block))
            .cloned()
            .collect()
    }
}

/// The whole simulated chain.
///
/// Every accepted write is mined into its own block.
#[derive(Debug, Default)]
pub struct ChainState {
    pub block_number: u64,
    pub dkg: Option<DkgContract>,
    pub voting: Option<VotingContract>,
    pub events: EventLog,
    /// Writes still to be rejected with a simulated conflict
    pub injected_conflicts: u32,
    /// Accepted writes whose response is still to be dropped
    pub lost_responses: u32,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mine a block and return its number.
    pub fn mine(&mut self) -> u64 {
        self.block_number += 1;
        self.block_number
    }

    pub fn advance_blocks(&mut self, n: u64) -> u64 {
        self.block_number += n;
        self.block_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkvote_crypto::Scalar;
    use zkvote_prover::{Circuit, Prover, SigmaProver};

    fn dkg(n: u8, threshold: u32) -> DkgContract {
        DkgContract {
            address: [0xd0; 32],
            committee: (1..=n).map(|i| [i; 32]).collect(),
            threshold,
            round1: BTreeMap::new(),
            round2: BTreeMap::new(),
            round2_vk: SigmaProver::new().verification_key(Circuit::Round2),
        }
    }

    #[test]
    fn test_member_ids_are_one_based() {
        let c = dkg(3, 2);
        assert_eq!(c.member_id(&[1u8; 32]), Some(1));
        assert_eq!(c.member_id(&[3u8; 32]), Some(3));
        assert_eq!(c.member_id(&[9u8; 32]), None);
        assert!(!c.is_valid_id(0));
        assert!(c.is_valid_id(3));
        assert!(!c.is_valid_id(4));
    }

    #[test]
    fn test_pk_coefficients_sum_members() {
        let mut c = dkg(2, 2);
        let p = |k: u64| Point::from_scalar(&Scalar::from_u64(k));
        c.round1.insert(1, vec![p(1), p(10)]);
        assert!(c.pk_coefficients().is_none());
        c.round1.insert(2, vec![p(2), p(20)]);
        assert_eq!(c.pk_coefficients().unwrap(), vec![p(3), p(30)]);
        assert_eq!(c.pk(), Some(p(3)));
        assert_eq!(c.round1_pk_for(2), Some(p(2)));
    }

    #[test]
    fn test_event_ranges_are_inclusive() {
        let mut log = EventLog::default();
        for (block, proposal_id) in [(3, 1), (5, 2), (9, 3)] {
            log.setup_votes.push(SetupVoteEvent {
                block_number: block,
                proposal_id,
                end_block: 100,
            });
        }
        let ids: Vec<u64> = log.setup_votes_between(5, 9).iter().map(|e| e.proposal_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(log.setup_votes_between(10, 20).is_empty());
    }

    #[test]
    fn test_mining_advances_head() {
        let mut state = ChainState::new();
        assert_eq!(state.mine(), 1);
        assert_eq!(state.advance_blocks(5), 6);
    }
}
