//! Ballot construction and submission.
//!
//! A ballot is three ElGamal ciphertexts in `VoteChoice::ALL` order
//! (abstain, nay, yay). The chosen slot encrypts the voter's weight, the
//! other two encrypt zero, each under fresh randomness:
//!
//! `R_k = r_k·G`, `M_k = r_k·PK + [k == choice]·weight·G`

use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroize;

use zkvote_crypto::{Ciphertext, CryptoError, Point, Scalar};
use zkvote_ledger::{Ledger, LedgerError, RetryPolicy};
use zkvote_prover::{prove_statement, NvoteStatement, NvoteWitness, Prover, ProverError};
use zkvote_types::{
    format_address, EncodedBallot, Proof, ProposalId, VoteChoice, VOTE_OPTIONS,
};

/// Errors that can occur while casting a vote.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Voter {0} has no voting weight")]
    NotRegistered(String),

    #[error("Already voted on proposal {0}")]
    AlreadyVoted(ProposalId),

    #[error("Ledger call failed while {stage}: {source}")]
    Ledger {
        stage: &'static str,
        #[source]
        source: LedgerError,
    },

    #[error("Proving ballot failed: {0}")]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn ledger_err(stage: &'static str) -> impl Fn(LedgerError) -> VoteError {
    move |source| VoteError::Ledger { stage, source }
}

/// An encrypted ballot together with the witness needed to prove it.
pub struct PreparedVote {
    pub choice: VoteChoice,
    pub weight: u64,
    pub ciphertexts: [Ciphertext; VOTE_OPTIONS],
    randomness: [Scalar; VOTE_OPTIONS],
}

impl PreparedVote {
    pub fn statement(&self, pk: &Point) -> NvoteStatement {
        NvoteStatement {
            pk: *pk,
            vote_power: self.weight,
            r: self.ciphertexts.map(|c| c.r),
            m: self.ciphertexts.map(|c| c.m),
        }
    }

    pub fn witness(&self) -> NvoteWitness {
        NvoteWitness {
            o: self.choice.bitmask(),
            randomness: self.randomness,
        }
    }

    pub fn encoded(&self) -> EncodedBallot {
        EncodedBallot {
            r: self.ciphertexts.map(|c| c.r.encode()),
            m: self.ciphertexts.map(|c| c.m.encode()),
        }
    }

    /// Prove the ballot is one-hot with total `weight`.
    pub fn prove<P: Prover + ?Sized>(&self, prover: &P, pk: &Point) -> Result<Proof, VoteError> {
        Ok(prove_statement(prover, &self.statement(pk), &self.witness())?)
    }
}

impl Drop for PreparedVote {
    fn drop(&mut self) {
        self.randomness.zeroize();
    }
}

/// Encrypt `weight` for `choice` under the committee key.
pub fn encrypt_vote<R: RngCore + CryptoRng>(
    pk: &Point,
    weight: u64,
    choice: VoteChoice,
    rng: &mut R,
) -> PreparedVote {
    let randomness = [Scalar::random(rng), Scalar::random(rng), Scalar::random(rng)];
    let mut ciphertexts = [Ciphertext::identity(); VOTE_OPTIONS];
    for option in VoteChoice::ALL {
        let k = option.index();
        let value = if option == choice { weight } else { 0 };
        ciphertexts[k] = Ciphertext::encrypt(pk, &Scalar::from_u64(value), &randomness[k]);
    }
    PreparedVote {
        choice,
        weight,
        ciphertexts,
        randomness,
    }
}

/// Look up the sender's weight, encrypt, prove and submit a ballot.
pub async fn cast_vote<L, P, R>(
    ledger: &L,
    prover: &P,
    proposal_id: ProposalId,
    choice: VoteChoice,
    retry: &RetryPolicy,
    rng: &mut R,
) -> Result<EncodedBallot, VoteError>
where
    L: Ledger + ?Sized,
    P: Prover + ?Sized,
    R: RngCore + CryptoRng,
{
    let voter = ledger.sender();
    let weight = ledger
        .get_voting_weight(voter)
        .await
        .map_err(ledger_err("reading voting weight"))?;
    if weight == 0 {
        return Err(VoteError::NotRegistered(format_address(&voter)));
    }
    if ledger
        .has_voted(proposal_id, voter)
        .await
        .map_err(ledger_err("checking prior vote"))?
    {
        return Err(VoteError::AlreadyVoted(proposal_id));
    }
    let pk = Point::decode(
        &ledger
            .get_pk()
            .await
            .map_err(ledger_err("reading committee key"))?,
    )?;

    let prepared = encrypt_vote(&pk, weight, choice, rng);
    let proof = prepared.prove(prover, &pk)?;
    let ballot = prepared.encoded();
    let submitted = retry
        .execute("vote", || ledger.vote(proposal_id, ballot.clone(), proof.clone()))
        .await;
    if let Err(e) = submitted {
        // An earlier attempt may have been included with its response lost.
        let landed = matches!(e, LedgerError::AlreadyVoted(_))
            && ledger
                .has_voted(proposal_id, voter)
                .await
                .map_err(ledger_err("checking prior vote"))?;
        if !landed {
            return Err(ledger_err("submitting ballot")(e));
        }
        debug!(proposal_id, "ballot already included by an earlier attempt");
    }

    info!(
        proposal_id,
        weight,
        voter = %format_address(&voter),
        "ballot submitted"
    );
    Ok(ballot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use zkvote_crypto::recover_discrete_log;
    use zkvote_prover::{verify_statement, Circuit, SigmaProver};

    #[test]
    fn test_ballot_is_one_hot() {
        let sk = Scalar::random(&mut OsRng);
        let pk = Point::from_scalar(&sk);
        for choice in VoteChoice::ALL {
            let vote = encrypt_vote(&pk, 5, choice, &mut OsRng);
            for option in VoteChoice::ALL {
                let value = vote.ciphertexts[option.index()].decrypt_to_point(&sk);
                let expected = if option == choice { 5 } else { 0 };
                assert_eq!(recover_discrete_log(&value, 10).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_fresh_randomness_per_slot() {
        let pk = Point::from_scalar(&Scalar::random(&mut OsRng));
        let vote = encrypt_vote(&pk, 1, VoteChoice::Nay, &mut OsRng);
        let r = vote.statement(&pk).r;
        assert_ne!(r[0], r[1]);
        assert_ne!(r[1], r[2]);
    }

    #[test]
    fn test_ballot_proof_verifies() {
        let prover = SigmaProver::new();
        let pk = Point::from_scalar(&Scalar::random(&mut OsRng));
        let vote = encrypt_vote(&pk, 12, VoteChoice::Abstain, &mut OsRng);
        let proof = vote.prove(&prover, &pk).unwrap();
        let key = prover.verification_key(Circuit::Nvote);
        assert!(verify_statement(&prover, &key, &vote.statement(&pk), &proof).unwrap());

        let mut inflated = vote.statement(&pk);
        inflated.vote_power = 13;
        assert!(!verify_statement(&prover, &key, &inflated, &proof).unwrap());
    }

    #[test]
    fn test_encoded_layout() {
        let pk = Point::from_scalar(&Scalar::random(&mut OsRng));
        let vote = encrypt_vote(&pk, 3, VoteChoice::Yay, &mut OsRng);
        let ballot = vote.encoded();
        assert_eq!(ballot.r[2], vote.ciphertexts[2].r.encode());
        assert_eq!(ballot.m[0], vote.ciphertexts[0].m.encode());
    }
}
