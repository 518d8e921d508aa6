//! [`ZkVoteApiServer`] over an [`InMemoryChain`].

use std::net::SocketAddr;

use anyhow::Result;
use jsonrpsee::core::async_trait;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use tracing::debug;

use zkvote_ledger::rpc::{parse_address_param, to_rpc_error, ZkVoteApiServer};
use zkvote_ledger::{InMemoryChain, InMemoryLedger, Ledger};
use zkvote_types::{
    Deployment, EncodedBallot, EncodedPoint, MemberId, Proof, ProposalId, Round2ShareEvent,
    Round2Submission, SetupVoteEvent, TallyCompleteEvent, VoteTotals, VOTE_OPTIONS,
};

/// Sender used for reads, which are not attributed to anyone.
const READER: [u8; 32] = [0u8; 32];

pub struct MockChainServer {
    chain: InMemoryChain,
}

impl MockChainServer {
    pub fn new(chain: InMemoryChain) -> Self {
        Self { chain }
    }

    fn reader(&self) -> InMemoryLedger {
        self.chain.connect(READER)
    }

    fn writer(&self, sender: &str) -> Result<InMemoryLedger, ErrorObjectOwned> {
        let sender = parse_address_param(sender)?;
        Ok(self.chain.connect(sender))
    }
}

/// Bind `addr` and serve `chain`, returning the bound address.
pub async fn start_server(chain: InMemoryChain, addr: SocketAddr) -> Result<(SocketAddr, ServerHandle)> {
    let server = Server::builder().build(addr).await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(MockChainServer::new(chain).into_rpc());
    Ok((local_addr, handle))
}

#[async_trait]
impl ZkVoteApiServer for MockChainServer {
    async fn chain_block_number(&self) -> Result<u64, ErrorObjectOwned> {
        Ok(self.chain.block_number())
    }

    async fn chain_deployment(&self) -> Result<Deployment, ErrorObjectOwned> {
        self.reader().deployment().await.map_err(to_rpc_error)
    }

    async fn admin_advance_blocks(&self, n: u64) -> Result<u64, ErrorObjectOwned> {
        Ok(self.chain.advance_blocks(n))
    }

    async fn dkg_n_comm(&self) -> Result<u32, ErrorObjectOwned> {
        self.reader().n_comm().await.map_err(to_rpc_error)
    }

    async fn dkg_threshold(&self) -> Result<u32, ErrorObjectOwned> {
        self.reader().threshold().await.map_err(to_rpc_error)
    }

    async fn dkg_member_id(&self, address: String) -> Result<MemberId, ErrorObjectOwned> {
        let address = parse_address_param(&address)?;
        self.reader().member_id(address).await.map_err(to_rpc_error)
    }

    async fn dkg_round1(
        &self,
        sender: String,
        commitments: Vec<EncodedPoint>,
    ) -> Result<(), ErrorObjectOwned> {
        debug!(%sender, "round1");
        self.writer(&sender)?
            .round1(commitments)
            .await
            .map_err(to_rpc_error)
    }

    async fn dkg_round1_complete(&self) -> Result<bool, ErrorObjectOwned> {
        self.reader().round1_complete().await.map_err(to_rpc_error)
    }

    async fn dkg_round1_pk_for(&self, id: MemberId) -> Result<EncodedPoint, ErrorObjectOwned> {
        self.reader().get_round1_pk_for(id).await.map_err(to_rpc_error)
    }

    async fn dkg_round1_commitments(
        &self,
        id: MemberId,
    ) -> Result<Vec<EncodedPoint>, ErrorObjectOwned> {
        self.reader()
            .get_round1_commitments(id)
            .await
            .map_err(to_rpc_error)
    }

    async fn dkg_round2(
        &self,
        sender: String,
        submission: Round2Submission,
    ) -> Result<(), ErrorObjectOwned> {
        debug!(%sender, recipient = submission.recipient_id, "round2");
        self.writer(&sender)?
            .round2(submission)
            .await
            .map_err(to_rpc_error)
    }

    async fn dkg_round2_share_received(
        &self,
        sender_id: MemberId,
        recipient_id: MemberId,
    ) -> Result<bool, ErrorObjectOwned> {
        self.reader()
            .round2_share_received(sender_id, recipient_id)
            .await
            .map_err(to_rpc_error)
    }

    async fn dkg_round2_complete(&self) -> Result<bool, ErrorObjectOwned> {
        self.reader().round2_complete().await.map_err(to_rpc_error)
    }

    async fn dkg_pk_coefficients(&self) -> Result<Vec<EncodedPoint>, ErrorObjectOwned> {
        self.reader().pk_coefficients().await.map_err(to_rpc_error)
    }

    async fn dkg_pk_for(&self, id: MemberId) -> Result<EncodedPoint, ErrorObjectOwned> {
        self.reader().get_pk_for(id).await.map_err(to_rpc_error)
    }

    async fn dkg_pk(&self) -> Result<EncodedPoint, ErrorObjectOwned> {
        self.reader().get_pk().await.map_err(to_rpc_error)
    }

    async fn dkg_round2_share_events(
        &self,
        recipient_id: MemberId,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Round2ShareEvent>, ErrorObjectOwned> {
        self.reader()
            .round2_share_events(recipient_id, from_block, to_block)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_add_voter(
        &self,
        sender: String,
        voter: String,
        weight: u64,
    ) -> Result<(), ErrorObjectOwned> {
        let voter = parse_address_param(&voter)?;
        self.writer(&sender)?
            .add_voter(voter, weight)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_voting_weight(&self, voter: String) -> Result<u64, ErrorObjectOwned> {
        let voter = parse_address_param(&voter)?;
        self.reader().get_voting_weight(voter).await.map_err(to_rpc_error)
    }

    async fn voting_has_voted(
        &self,
        proposal_id: ProposalId,
        voter: String,
    ) -> Result<bool, ErrorObjectOwned> {
        let voter = parse_address_param(&voter)?;
        self.reader()
            .has_voted(proposal_id, voter)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_setup_vote(
        &self,
        sender: String,
        proposal_id: ProposalId,
        end_block: u64,
    ) -> Result<(), ErrorObjectOwned> {
        self.writer(&sender)?
            .setup_vote(proposal_id, end_block)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_setup_vote_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SetupVoteEvent>, ErrorObjectOwned> {
        self.reader()
            .setup_vote_events(from_block, to_block)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_vote(
        &self,
        sender: String,
        proposal_id: ProposalId,
        ballot: EncodedBallot,
        proof: Proof,
    ) -> Result<(), ErrorObjectOwned> {
        debug!(%sender, proposal_id, "vote");
        self.writer(&sender)?
            .vote(proposal_id, ballot, proof)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_r(
        &self,
        proposal_id: ProposalId,
    ) -> Result<[EncodedPoint; VOTE_OPTIONS], ErrorObjectOwned> {
        self.reader().get_r(proposal_id).await.map_err(to_rpc_error)
    }

    async fn voting_m(
        &self,
        proposal_id: ProposalId,
    ) -> Result<[EncodedPoint; VOTE_OPTIONS], ErrorObjectOwned> {
        self.reader().get_m(proposal_id).await.map_err(to_rpc_error)
    }

    async fn voting_weight_used(&self, proposal_id: ProposalId) -> Result<u64, ErrorObjectOwned> {
        self.reader()
            .voting_weight_used(proposal_id)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_tally(
        &self,
        sender: String,
        proposal_id: ProposalId,
        d: [EncodedPoint; VOTE_OPTIONS],
        proof: Proof,
    ) -> Result<(), ErrorObjectOwned> {
        debug!(%sender, proposal_id, "tally");
        self.writer(&sender)?
            .tally(proposal_id, d, proof)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_is_tally_complete(
        &self,
        proposal_id: ProposalId,
    ) -> Result<bool, ErrorObjectOwned> {
        self.reader()
            .is_tally_complete(proposal_id)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_tally_complete_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TallyCompleteEvent>, ErrorObjectOwned> {
        self.reader()
            .tally_complete_events(from_block, to_block)
            .await
            .map_err(to_rpc_error)
    }

    async fn voting_vote_totals(
        &self,
        proposal_id: ProposalId,
    ) -> Result<VoteTotals, ErrorObjectOwned> {
        self.reader()
            .get_vote_totals(proposal_id)
            .await
            .map_err(to_rpc_error)
    }
}
