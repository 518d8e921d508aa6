//! JSON-RPC surface of the ledger.
//!
//! The server side is implemented by the `mock-chain` binary on top of
//! [`InMemoryChain`](crate::InMemoryChain); [`RpcLedger`] is the client.
//! Writes carry the sender address explicitly since the mock chain does
//! not check signatures.
//!
//! Errors travel as JSON-RPC error objects whose `data` is the serialized
//! [`LedgerError`], so the client sees the same variant the server raised.

use async_trait::async_trait;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use tracing::debug;

use zkvote_types::{
    format_address, parse_address, Address, Deployment, EncodedBallot, EncodedPoint, MemberId,
    Proof, ProposalId, Round2ShareEvent, Round2Submission, SetupVoteEvent, TallyCompleteEvent,
    VoteTotals, VOTE_OPTIONS,
};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;

/// Error code for deterministic rejections.
pub const REJECTED_CODE: i32 = -32000;
/// Error code for failures worth retrying.
pub const TRANSIENT_CODE: i32 = -32001;

#[rpc(server, client)]
pub trait ZkVoteApi {
    // ============ Chain ============

    #[method(name = "chain_blockNumber")]
    async fn chain_block_number(&self) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "chain_deployment")]
    async fn chain_deployment(&self) -> Result<Deployment, ErrorObjectOwned>;

    /// Mine `n` empty blocks and return the new head.
    #[method(name = "admin_advanceBlocks")]
    async fn admin_advance_blocks(&self, n: u64) -> Result<u64, ErrorObjectOwned>;

    // ============ DKG contract ============

    #[method(name = "dkg_nComm")]
    async fn dkg_n_comm(&self) -> Result<u32, ErrorObjectOwned>;

    #[method(name = "dkg_threshold")]
    async fn dkg_threshold(&self) -> Result<u32, ErrorObjectOwned>;

    #[method(name = "dkg_memberId")]
    async fn dkg_member_id(&self, address: String) -> Result<MemberId, ErrorObjectOwned>;

    #[method(name = "dkg_round1")]
    async fn dkg_round1(
        &self,
        sender: String,
        commitments: Vec<EncodedPoint>,
    ) -> Result<(), ErrorObjectOwned>;

    #[method(name = "dkg_round1Complete")]
    async fn dkg_round1_complete(&self) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "dkg_round1PkFor")]
    async fn dkg_round1_pk_for(&self, id: MemberId) -> Result<EncodedPoint, ErrorObjectOwned>;

    #[method(name = "dkg_round1Commitments")]
    async fn dkg_round1_commitments(
        &self,
        id: MemberId,
    ) -> Result<Vec<EncodedPoint>, ErrorObjectOwned>;

    #[method(name = "dkg_round2")]
    async fn dkg_round2(
        &self,
        sender: String,
        submission: Round2Submission,
    ) -> Result<(), ErrorObjectOwned>;

    #[method(name = "dkg_round2ShareReceived")]
    async fn dkg_round2_share_received(
        &self,
        sender_id: MemberId,
        recipient_id: MemberId,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "dkg_round2Complete")]
    async fn dkg_round2_complete(&self) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "dkg_pkCoefficients")]
    async fn dkg_pk_coefficients(&self) -> Result<Vec<EncodedPoint>, ErrorObjectOwned>;

    #[method(name = "dkg_pkFor")]
    async fn dkg_pk_for(&self, id: MemberId) -> Result<EncodedPoint, ErrorObjectOwned>;

    #[method(name = "dkg_pk")]
    async fn dkg_pk(&self) -> Result<EncodedPoint, ErrorObjectOwned>;

    #[method(name = "dkg_round2ShareEvents")]
    async fn dkg_round2_share_events(
        &self,
        recipient_id: MemberId,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Round2ShareEvent>, ErrorObjectOwned>;

    // ============ Voting contract ============

    #[method(name = "voting_addVoter")]
    async fn voting_add_voter(
        &self,
        sender: String,
        voter: String,
        weight: u64,
    ) -> Result<(), ErrorObjectOwned>;

    #[method(name = "voting_votingWeight")]
    async fn voting_voting_weight(&self, voter: String) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "voting_hasVoted")]
    async fn voting_has_voted(
        &self,
        proposal_id: ProposalId,
        voter: String,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "voting_setupVote")]
    async fn voting_setup_vote(
        &self,
        sender: String,
        proposal_id: ProposalId,
        end_block: u64,
    ) -> Result<(), ErrorObjectOwned>;

    #[method(name = "voting_setupVoteEvents")]
    async fn voting_setup_vote_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SetupVoteEvent>, ErrorObjectOwned>;

    #[method(name = "voting_vote")]
    async fn voting_vote(
        &self,
        sender: String,
        proposal_id: ProposalId,
        ballot: EncodedBallot,
        proof: Proof,
    ) -> Result<(), ErrorObjectOwned>;

    #[method(name = "voting_r")]
    async fn voting_r(
        &self,
        proposal_id: ProposalId,
    ) -> Result<[EncodedPoint; VOTE_OPTIONS], ErrorObjectOwned>;

    #[method(name = "voting_m")]
    async fn voting_m(
        &self,
        proposal_id: ProposalId,
    ) -> Result<[EncodedPoint; VOTE_OPTIONS], ErrorObjectOwned>;

    #[method(name = "voting_weightUsed")]
    async fn voting_weight_used(&self, proposal_id: ProposalId) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "voting_tally")]
    async fn voting_tally(
        &self,
        sender: String,
        proposal_id: ProposalId,
        d: [EncodedPoint; VOTE_OPTIONS],
        proof: Proof,
    ) -> Result<(), ErrorObjectOwned>;

    #[method(name = "voting_isTallyComplete")]
    async fn voting_is_tally_complete(
        &self,
        proposal_id: ProposalId,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "voting_tallyCompleteEvents")]
    async fn voting_tally_complete_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TallyCompleteEvent>, ErrorObjectOwned>;

    #[method(name = "voting_voteTotals")]
    async fn voting_vote_totals(&self, proposal_id: ProposalId)
        -> Result<VoteTotals, ErrorObjectOwned>;
}

/// Encode a ledger error for the wire.
pub fn to_rpc_error(err: LedgerError) -> ErrorObjectOwned {
    let code = if err.is_transient() {
        TRANSIENT_CODE
    } else {
        REJECTED_CODE
    };
    ErrorObjectOwned::owned(code, err.to_string(), Some(err))
}

/// Decode a client-side failure back into the ledger error it carries.
pub fn from_client_error(err: ClientError) -> LedgerError {
    match err {
        ClientError::Call(object) => object
            .data()
            .and_then(|raw| serde_json::from_str::<LedgerError>(raw.get()).ok())
            .unwrap_or_else(|| LedgerError::Transport(object.message().to_string())),
        other => LedgerError::Transport(other.to_string()),
    }
}

/// Parse a hex address parameter.
pub fn parse_address_param(value: &str) -> Result<Address, ErrorObjectOwned> {
    parse_address(value).ok_or_else(|| {
        to_rpc_error(LedgerError::InvalidEncoding(format!(
            "invalid address {:?}",
            value
        )))
    })
}

/// [`Ledger`] backed by a mock-chain JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcLedger {
    client: HttpClient,
    sender: Address,
}

impl RpcLedger {
    pub fn connect(url: &str, sender: Address) -> LedgerResult<Self> {
        let client = HttpClientBuilder::default()
            .build(url)
            .map_err(from_client_error)?;
        debug!(url, sender = %format_address(&sender), "connected to ledger");
        Ok(Self { client, sender })
    }

    /// Mine `n` empty blocks on the remote chain.
    pub async fn advance_blocks(&self, n: u64) -> LedgerResult<u64> {
        self.client
            .admin_advance_blocks(n)
            .await
            .map_err(from_client_error)
    }

    fn sender_param(&self) -> String {
        format_address(&self.sender)
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        self.client.chain_block_number().await.map_err(from_client_error)
    }

    async fn deployment(&self) -> LedgerResult<Deployment> {
        self.client.chain_deployment().await.map_err(from_client_error)
    }

    async fn n_comm(&self) -> LedgerResult<u32> {
        self.client.dkg_n_comm().await.map_err(from_client_error)
    }

    async fn threshold(&self) -> LedgerResult<u32> {
        self.client.dkg_threshold().await.map_err(from_client_error)
    }

    async fn member_id(&self, address: Address) -> LedgerResult<MemberId> {
        self.client
            .dkg_member_id(format_address(&address))
            .await
            .map_err(from_client_error)
    }

    async fn round1(&self, commitments: Vec<EncodedPoint>) -> LedgerResult<()> {
        self.client
            .dkg_round1(self.sender_param(), commitments)
            .await
            .map_err(from_client_error)
    }

    async fn round1_complete(&self) -> LedgerResult<bool> {
        self.client.dkg_round1_complete().await.map_err(from_client_error)
    }

    async fn get_round1_pk_for(&self, id: MemberId) -> LedgerResult<EncodedPoint> {
        self.client.dkg_round1_pk_for(id).await.map_err(from_client_error)
    }

    async fn get_round1_commitments(&self, id: MemberId) -> LedgerResult<Vec<EncodedPoint>> {
        self.client
            .dkg_round1_commitments(id)
            .await
            .map_err(from_client_error)
    }

    async fn round2(&self, submission: Round2Submission) -> LedgerResult<()> {
        self.client
            .dkg_round2(self.sender_param(), submission)
            .await
            .map_err(from_client_error)
    }

    async fn round2_share_received(
        &self,
        sender: MemberId,
        recipient: MemberId,
    ) -> LedgerResult<bool> {
        self.client
            .dkg_round2_share_received(sender, recipient)
            .await
            .map_err(from_client_error)
    }

    async fn round2_complete(&self) -> LedgerResult<bool> {
        self.client.dkg_round2_complete().await.map_err(from_client_error)
    }

    async fn pk_coefficients(&self) -> LedgerResult<Vec<EncodedPoint>> {
        self.client.dkg_pk_coefficients().await.map_err(from_client_error)
    }

    async fn get_pk_for(&self, id: MemberId) -> LedgerResult<EncodedPoint> {
        self.client.dkg_pk_for(id).await.map_err(from_client_error)
    }

    async fn get_pk(&self) -> LedgerResult<EncodedPoint> {
        self.client.dkg_pk().await.map_err(from_client_error)
    }

    async fn round2_share_events(
        &self,
        recipient: MemberId,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<Round2ShareEvent>> {
        self.client
            .dkg_round2_share_events(recipient, from_block, to_block)
            .await
            .map_err(from_client_error)
    }

    async fn add_voter(&self, voter: Address, weight: u64) -> LedgerResult<()> {
        self.client
            .voting_add_voter(self.sender_param(), format_address(&voter), weight)
            .await
            .map_err(from_client_error)
    }

    async fn get_voting_weight(&self, voter: Address) -> LedgerResult<u64> {
        self.client
            .voting_voting_weight(format_address(&voter))
            .await
            .map_err(from_client_error)
    }

    async fn has_voted(&self, proposal_id: ProposalId, voter: Address) -> LedgerResult<bool> {
        self.client
            .voting_has_voted(proposal_id, format_address(&voter))
            .await
            .map_err(from_client_error)
    }

    async fn setup_vote(&self, proposal_id: ProposalId, end_block: u64) -> LedgerResult<()> {
        self.client
            .voting_setup_vote(self.sender_param(), proposal_id, end_block)
            .await
            .map_err(from_client_error)
    }

    async fn setup_vote_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<SetupVoteEvent>> {
        self.client
            .voting_setup_vote_events(from_block, to_block)
            .await
            .map_err(from_client_error)
    }

    async fn vote(
        &self,
        proposal_id: ProposalId,
        ballot: EncodedBallot,
        proof: Proof,
    ) -> LedgerResult<()> {
        self.client
            .voting_vote(self.sender_param(), proposal_id, ballot, proof)
            .await
            .map_err(from_client_error)
    }

    async fn get_r(&self, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]> {
        self.client.voting_r(proposal_id).await.map_err(from_client_error)
    }

    async fn get_m(&self, proposal_id: ProposalId) -> LedgerResult<[EncodedPoint; VOTE_OPTIONS]> {
        self.client.voting_m(proposal_id).await.map_err(from_client_error)
    }

    async fn voting_weight_used(&self, proposal_id: ProposalId) -> LedgerResult<u64> {
        self.client
            .voting_weight_used(proposal_id)
            .await
            .map_err(from_client_error)
    }

    async fn tally(
        &self,
        proposal_id: ProposalId,
        d: [EncodedPoint; VOTE_OPTIONS],
        proof: Proof,
    ) -> LedgerResult<()> {
        self.client
            .voting_tally(self.sender_param(), proposal_id, d, proof)
            .await
            .map_err(from_client_error)
    }

    async fn is_tally_complete(&self, proposal_id: ProposalId) -> LedgerResult<bool> {
        self.client
            .voting_is_tally_complete(proposal_id)
            .await
            .map_err(from_client_error)
    }

    async fn tally_complete_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<TallyCompleteEvent>> {
        self.client
            .voting_tally_complete_events(from_block, to_block)
            .await
            .map_err(from_client_error)
    }

    async fn get_vote_totals(&self, proposal_id: ProposalId) -> LedgerResult<VoteTotals> {
        self.client
            .voting_vote_totals(proposal_id)
            .await
            .map_err(from_client_error)
    }
}
