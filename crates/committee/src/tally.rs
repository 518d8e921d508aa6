//! Partial decryption of a proposal's accumulated ballots.
//!
//! For the summed ciphertexts `R[k]` the member submits `D_i[k] = sk_i·R[k]`
//! with a proof that the same `sk_i` underlies its public share `PK_i`.
//! The ledger combines the first `t` shares. A member arriving after that
//! is told the tally is complete, which counts as success.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use zkvote_crypto::{partial_decrypt, CryptoError, Point};
use zkvote_dkg::CommitteeMember;
use zkvote_ledger::{Ledger, LedgerError, RetryPolicy};
use zkvote_prover::{prove_statement, Circuit, Prover, ProverError, TallyStatement, TallyWitness};
use zkvote_types::{ProposalId, VOTE_OPTIONS};

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("Ledger call failed tallying proposal {proposal_id}: {source}")]
    Ledger {
        proposal_id: ProposalId,
        #[source]
        source: LedgerError,
    },

    #[error("Proving partial decryption for proposal {proposal_id} failed: {source}")]
    Prover {
        proposal_id: ProposalId,
        #[source]
        source: ProverError,
    },

    #[error("Ballots for proposal {0} changed while tallying")]
    StaleBallots(ProposalId),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl TallyError {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TallyError::Ledger { source, .. } => source.is_transient(),
            TallyError::StaleBallots(_) => true,
            _ => false,
        }
    }
}

/// Result of a successful [`TallyEngine::tally`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyOutcome {
    /// Our partial decryption was accepted
    Submitted,
    /// The ledger already held our partial decryption
    AlreadySubmitted,
    /// Enough members had already tallied
    AlreadyComplete,
}

/// Produces and submits one member's partial decryptions.
pub struct TallyEngine<L> {
    ledger: L,
    prover: Arc<dyn Prover>,
    member: CommitteeMember,
    retry: RetryPolicy,
}

impl<L: Ledger> TallyEngine<L> {
    pub fn new(ledger: L, prover: Arc<dyn Prover>, member: CommitteeMember) -> Self {
        Self {
            ledger,
            prover,
            member,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn member(&self) -> &CommitteeMember {
        &self.member
    }

    /// `D_i[k] = sk_i·R[k]`.
    pub fn partial_decryption(&self, r: &[Point; VOTE_OPTIONS]) -> [Point; VOTE_OPTIONS] {
        r.map(|r_k| partial_decrypt(self.member.secret_share(), &r_k))
    }

    async fn read_r(&self, proposal_id: ProposalId) -> Result<[Point; VOTE_OPTIONS], TallyError> {
        let encoded = self
            .ledger
            .get_r(proposal_id)
            .await
            .map_err(|source| TallyError::Ledger {
                proposal_id,
                source,
            })?;
        Ok([
            Point::decode(&encoded[0])?,
            Point::decode(&encoded[1])?,
            Point::decode(&encoded[2])?,
        ])
    }

    async fn is_complete(&self, proposal_id: ProposalId) -> Result<bool, TallyError> {
        self.ledger
            .is_tally_complete(proposal_id)
            .await
            .map_err(|source| TallyError::Ledger {
                proposal_id,
                source,
            })
    }

    async fn after_rejection(
        &self,
        proposal_id: ProposalId,
        r: &[Point; VOTE_OPTIONS],
        source: LedgerError,
    ) -> Result<TallyOutcome, TallyError> {
        // The write may have lost a race to the share that completed the tally.
        if self.is_complete(proposal_id).await? {
            return Ok(TallyOutcome::AlreadyComplete);
        }
        if matches!(source, LedgerError::InvalidProof(Circuit::Tally))
            && self.read_r(proposal_id).await? != *r
        {
            return Err(TallyError::StaleBallots(proposal_id));
        }
        Err(TallyError::Ledger {
            proposal_id,
            source,
        })
    }

    /// Submit this member's partial decryption for `proposal_id`.
    pub async fn tally(&self, proposal_id: ProposalId) -> Result<TallyOutcome, TallyError> {
        let member_id = self.member.member_id;
        if self.is_complete(proposal_id).await? {
            debug!(proposal_id, member_id, "tally already complete");
            return Ok(TallyOutcome::AlreadyComplete);
        }

        let r = self.read_r(proposal_id).await?;
        let statement = TallyStatement {
            pk_i: self.member.public_share,
            r,
            d: self.partial_decryption(&r),
        };
        let witness = TallyWitness {
            sk_i: *self.member.secret_share(),
        };
        let proof = prove_statement(self.prover.as_ref(), &statement, &witness)
            .map_err(|source| TallyError::Prover {
                proposal_id,
                source,
            })?;

        let d = statement.d.map(|p| p.encode());
        let ledger = &self.ledger;
        let result = self
            .retry
            .execute("tally", || ledger.tally(proposal_id, d.clone(), proof.clone()))
            .await;

        let outcome = match result {
            Ok(()) => TallyOutcome::Submitted,
            Err(LedgerError::TallyAlreadyComplete(_)) => TallyOutcome::AlreadyComplete,
            Err(LedgerError::AlreadyTallied { .. }) => TallyOutcome::AlreadySubmitted,
            Err(source) => self.after_rejection(proposal_id, &r, source).await?,
        };
        info!(proposal_id, member_id, ?outcome, "tally step finished");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use zkvote_types::VoteChoice;

    #[tokio::test]
    async fn test_threshold_tally() {
        let fixture = Fixture::new(3, 2).await;
        let end_block = fixture.open_proposal(1, 20).await;
        fixture.vote(1, 5, 1, VoteChoice::Yay).await;
        fixture.vote(2, 3, 1, VoteChoice::Nay).await;
        fixture.chain.advance_blocks(end_block);

        let ledger = fixture.chain.connect([0xEE; 32]);
        assert_eq!(fixture.engine(1).tally(1).await.unwrap(), TallyOutcome::Submitted);
        assert!(!ledger.is_tally_complete(1).await.unwrap());
        assert_eq!(fixture.engine(3).tally(1).await.unwrap(), TallyOutcome::Submitted);
        assert!(ledger.is_tally_complete(1).await.unwrap());
        assert_eq!(ledger.get_vote_totals(1).await.unwrap(), [0, 3, 5]);

        assert_eq!(
            fixture.engine(2).tally(1).await.unwrap(),
            TallyOutcome::AlreadyComplete
        );
    }

    #[tokio::test]
    async fn test_repeated_tally_is_benign() {
        let fixture = Fixture::new(3, 2).await;
        fixture.open_proposal(4, 5).await;
        fixture.vote(1, 2, 4, VoteChoice::Abstain).await;

        let engine = fixture.engine(2);
        assert_eq!(engine.tally(4).await.unwrap(), TallyOutcome::Submitted);
        assert_eq!(engine.tally(4).await.unwrap(), TallyOutcome::AlreadySubmitted);
    }

    #[tokio::test]
    async fn test_partial_decryption_matches_share() {
        let fixture = Fixture::new(2, 1).await;
        let engine = fixture.engine(1);
        let r = [Point::generator(); VOTE_OPTIONS];
        let d = engine.partial_decryption(&r);
        assert_eq!(d[0], engine.member().public_share);
    }

    #[tokio::test]
    async fn test_unknown_proposal_is_an_error() {
        let fixture = Fixture::new(2, 1).await;
        let err = fixture.engine(1).tally(99).await.unwrap_err();
        assert!(matches!(
            err,
            TallyError::Ledger {
                proposal_id: 99,
                source: LedgerError::ProposalNotFound(99)
            }
        ));
        assert!(!err.is_retryable());
    }
}
