//! DKG participant driven against the ledger.
//!
//! ```text
//! Created -> Round1Posted -> Round1Complete -> Round2Posted
//!         -> Round2Complete -> Recovered
//! ```
//!
//! Round 1 publishes the Feldman commitments. Round 2 encrypts `f(j)` to
//! every member `j` (self included) under `j`'s round-1 key `C_{j,0}` and
//! proves the encryption correct. Each member then decrypts the `n` shares
//! addressed to it, checks each against its sender's commitments, sums them,
//! and checks the sum against the aggregate commitments and the public share
//! the ledger derived. Any mismatch aborts.

use std::sync::Arc;

use futures::future::try_join_all;
use rand::rngs::OsRng;
use tracing::{debug, info};

use zkvote_crypto::cipher::{decrypt, encrypt};
use zkvote_crypto::curve::{decode_field, encode_field};
use zkvote_crypto::{
    decode_points, derive_seed, encode_points, Point, Scalar, SigningCapability, DKG_SEED_DOMAIN,
};
use zkvote_ledger::{Ledger, LedgerError, PollPolicy, RetryPolicy};
use zkvote_prover::{prove_statement, Prover, Round2Statement, Round2Witness};
use zkvote_types::{MemberId, Round2Submission};

use crate::error::DkgError;
use crate::feldman::{expected_public_share, verify_share, KeyGenPolynomial};
use crate::types::{CommitteeMember, DkgConfig, DkgPhase, Round2Share};

/// One committee member's view of a DKG run.
pub struct DkgParticipant<L> {
    config: DkgConfig,
    ledger: L,
    prover: Arc<dyn Prover>,
    polynomial: KeyGenPolynomial,
    commitments: Vec<Point>,
    phase: DkgPhase,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl<L: Ledger> DkgParticipant<L> {
    /// Participant with a uniformly random polynomial.
    pub fn initialize(config: DkgConfig, ledger: L, prover: Arc<dyn Prover>) -> Self {
        let polynomial = KeyGenPolynomial::generate(config.threshold, &mut OsRng);
        Self::with_polynomial(config, ledger, prover, polynomial)
    }

    /// Participant whose `a_0` is fixed; higher coefficients stay random.
    pub fn initialize_with_seed(
        config: DkgConfig,
        ledger: L,
        prover: Arc<dyn Prover>,
        a_0: Scalar,
    ) -> Self {
        let polynomial = KeyGenPolynomial::with_secret(a_0, config.threshold, &mut OsRng);
        Self::with_polynomial(config, ledger, prover, polynomial)
    }

    /// Participant whose `a_0` is derived from `signer`, so that the share
    /// can be recovered after a restart.
    pub fn from_signer<S: SigningCapability + ?Sized>(
        config: DkgConfig,
        ledger: L,
        prover: Arc<dyn Prover>,
        signer: &S,
    ) -> Result<Self, DkgError> {
        let a_0 = derive_seed(DKG_SEED_DOMAIN, signer)?;
        Ok(Self::initialize_with_seed(config, ledger, prover, a_0))
    }

    fn with_polynomial(
        config: DkgConfig,
        ledger: L,
        prover: Arc<dyn Prover>,
        polynomial: KeyGenPolynomial,
    ) -> Self {
        let commitments = polynomial.commitments();
        Self {
            config,
            ledger,
            prover,
            polynomial,
            commitments,
            phase: DkgPhase::Created,
            retry: RetryPolicy::default(),
            poll: PollPolicy::quorum(),
        }
    }

    pub fn with_policies(mut self, retry: RetryPolicy, poll: PollPolicy) -> Self {
        self.retry = retry;
        self.poll = poll;
        self
    }

    pub fn member_id(&self) -> MemberId {
        self.config.member_id
    }

    pub fn phase(&self) -> DkgPhase {
        self.phase
    }

    pub fn commitments(&self) -> &[Point] {
        &self.commitments
    }

    /// Round-1 public key `a_0·G`.
    pub fn round1_pk(&self) -> Point {
        self.commitments[0]
    }

    fn ledger_err(&self, source: LedgerError) -> DkgError {
        DkgError::Ledger {
            phase: self.phase,
            source,
        }
    }

    /// Publish the commitment vector. Re-publishing the same vector is a
    /// no-op on the ledger, so this is safe to repeat.
    pub async fn round1(&mut self) -> Result<(), DkgError> {
        let commitments = encode_points(&self.commitments);
        let ledger = &self.ledger;
        self.retry
            .execute("round1", || ledger.round1(commitments.clone()))
            .await
            .map_err(|e| self.ledger_err(e))?;
        if self.phase < DkgPhase::Round1Posted {
            self.phase = DkgPhase::Round1Posted;
        }
        info!(member_id = self.config.member_id, "round 1 commitments posted");
        Ok(())
    }

    /// Wait until every member has posted round-1 commitments.
    pub async fn round1_wait(&mut self) -> Result<(), DkgError> {
        let ledger = &self.ledger;
        self.poll
            .wait_until("round1 complete", || ledger.round1_complete())
            .await
            .map_err(|e| self.ledger_err(e))?;
        if self.phase < DkgPhase::Round1Complete {
            self.phase = DkgPhase::Round1Complete;
        }
        info!(member_id = self.config.member_id, "round 1 complete");
        Ok(())
    }

    /// `f(recipient)`, checked against our own commitments before use.
    pub fn compute_share_for(&self, recipient: MemberId) -> Result<Scalar, DkgError> {
        let share = self.polynomial.evaluate(recipient);
        if !verify_share(&share, recipient, &self.commitments) {
            return Err(DkgError::LocalShareMismatch { recipient });
        }
        Ok(share)
    }

    /// Encrypt and publish a share to every member, skipping shares the
    /// ledger already holds. Publications run concurrently.
    pub async fn round2(&mut self) -> Result<(), DkgError> {
        if self.phase < DkgPhase::Round1Complete {
            return Err(DkgError::OutOfOrder {
                operation: "round2",
                phase: self.phase,
            });
        }
        let this = &*self;
        let published = try_join_all((1..=this.config.n).map(|recipient| this.send_share(recipient)))
            .await?
            .into_iter()
            .filter(|sent| *sent)
            .count();
        self.phase = DkgPhase::Round2Posted;
        info!(
            member_id = self.config.member_id,
            published,
            "round 2 shares posted"
        );
        Ok(())
    }

    /// Returns whether a new share was published.
    async fn send_share(&self, recipient: MemberId) -> Result<bool, DkgError> {
        let sender = self.config.member_id;
        let received = self
            .ledger
            .round2_share_received(sender, recipient)
            .await
            .map_err(|e| self.ledger_err(e))?;
        if received {
            debug!(member_id = sender, recipient, "share already on ledger");
            return Ok(false);
        }

        let recipient_pk = Point::decode(
            &self
                .ledger
                .get_round1_pk_for(recipient)
                .await
                .map_err(|e| self.ledger_err(e))?,
        )?;
        let share = self.compute_share_for(recipient)?;
        let encryption = encrypt(&share, &recipient_pk, &mut OsRng)?;

        let statement = Round2Statement {
            recipient_id: recipient,
            recipient_pk,
            share_commitment: Point::from_scalar(&share),
            ciphertext: encryption.share.ciphertext,
            ephemeral_pk: encryption.share.ephemeral_pk,
            coefficient_commitments: self.commitments.clone(),
        };
        let witness = Round2Witness {
            share,
            ephemeral_sk: encryption.ephemeral_sk,
        };
        let proof = prove_statement(self.prover.as_ref(), &statement, &witness)
            .map_err(|source| DkgError::Prover { recipient, source })?;

        let submission = Round2Submission {
            recipient_id: recipient,
            ciphertext: encode_field(&statement.ciphertext),
            ephemeral_pk: statement.ephemeral_pk.encode(),
            share_commitment: statement.share_commitment.encode(),
            proof,
        };
        let ledger = &self.ledger;
        let result = self
            .retry
            .execute("round2", || ledger.round2(submission.clone()))
            .await;
        if let Err(e) = result {
            // An earlier attempt may have landed with its response lost.
            let landed = matches!(e, LedgerError::Round2AlreadyPosted { .. })
                && self.share_delivered(recipient).await?;
            if !landed {
                return Err(self.ledger_err(e));
            }
        }
        debug!(member_id = sender, recipient, "share posted");
        Ok(true)
    }

    async fn share_delivered(&self, recipient: MemberId) -> Result<bool, DkgError> {
        self.ledger
            .round2_share_received(self.config.member_id, recipient)
            .await
            .map_err(|e| self.ledger_err(e))
    }

    /// Barrier: wait until all `n×n` shares are on the ledger.
    pub async fn round2_wait(&mut self) -> Result<(), DkgError> {
        let ledger = &self.ledger;
        self.poll
            .wait_until("round2 complete", || ledger.round2_complete())
            .await
            .map_err(|e| self.ledger_err(e))?;
        self.phase = DkgPhase::Round2Complete;
        info!(member_id = self.config.member_id, "round 2 complete");
        Ok(())
    }

    async fn shares_for_self(&self) -> Result<Vec<Round2Share>, DkgError> {
        let events = self
            .ledger
            .round2_share_events(self.config.member_id, self.config.from_block, u64::MAX)
            .await
            .map_err(|e| self.ledger_err(e))?;
        events
            .iter()
            .map(|event| -> Result<Round2Share, DkgError> {
                Ok(Round2Share {
                    sender_id: event.sender_id,
                    ciphertext: decode_field(&event.ciphertext)?,
                    ephemeral_pk: Point::decode(&event.ephemeral_pk)?,
                })
            })
            .collect()
    }

    async fn sender_commitments(&self, sender: MemberId) -> Result<Vec<Point>, DkgError> {
        let encoded = self
            .ledger
            .get_round1_commitments(sender)
            .await
            .map_err(|e| self.ledger_err(e))?;
        Ok(decode_points(&encoded)?)
    }

    /// Decrypt a received share and check it against its sender's commitments.
    async fn open_share(&self, share: &Round2Share) -> Result<Scalar, DkgError> {
        let member_id = self.config.member_id;
        let value = decrypt(&share.ephemeral_pk, &share.ciphertext, self.polynomial.secret())?;
        let value = Scalar::from_base_field(&value);
        let commitments = self.sender_commitments(share.sender_id).await?;
        if !verify_share(&value, member_id, &commitments) {
            return Err(DkgError::InvalidShare {
                member_id,
                sender_id: share.sender_id,
            });
        }
        Ok(value)
    }

    /// Decrypt, check and sum the shares addressed to this member, then
    /// check the result against the ledger. Requires round 2 to be complete.
    pub async fn construct_secret_share(&mut self) -> Result<CommitteeMember, DkgError> {
        if self.phase < DkgPhase::Round2Complete {
            return Err(DkgError::OutOfOrder {
                operation: "construct_secret_share",
                phase: self.phase,
            });
        }
        let member_id = self.config.member_id;
        let shares = self.shares_for_self().await?;
        let n = self.config.n as usize;
        if shares.len() != n {
            return Err(DkgError::ShareCountMismatch {
                member_id,
                expected: n,
                got: shares.len(),
            });
        }
        let mut senders: Vec<MemberId> = shares.iter().map(|s| s.sender_id).collect();
        senders.sort_unstable();
        senders.dedup();
        if senders.len() != n {
            return Err(DkgError::ShareReconstruction {
                member_id,
                reason: "duplicate round 2 sender".into(),
            });
        }

        let values = try_join_all(shares.iter().map(|share| self.open_share(share))).await?;
        let secret_share: Scalar = values.into_iter().sum();

        let aggregate = decode_points(
            &self
                .ledger
                .pk_coefficients()
                .await
                .map_err(|e| self.ledger_err(e))?,
        )?;
        if Point::from_scalar(&secret_share) != expected_public_share(&aggregate, member_id) {
            return Err(DkgError::ShareReconstruction {
                member_id,
                reason: "secret share fails the Feldman check against aggregate commitments"
                    .into(),
            });
        }

        let public_share = Point::decode(
            &self
                .ledger
                .get_pk_for(member_id)
                .await
                .map_err(|e| self.ledger_err(e))?,
        )?;
        let public_key = Point::decode(&self.ledger.get_pk().await.map_err(|e| self.ledger_err(e))?)?;
        let member = CommitteeMember::new(
            member_id,
            self.config.threshold,
            self.config.n,
            secret_share,
            public_share,
            public_key,
        )
        .map_err(|_| DkgError::ShareReconstruction {
            member_id,
            reason: "secret share disagrees with the ledger's public share".into(),
        })?;

        self.phase = DkgPhase::Recovered;
        info!(member_id, "secret share reconstructed");
        Ok(member)
    }

    /// Run the whole protocol.
    pub async fn run(mut self) -> Result<CommitteeMember, DkgError> {
        self.round1().await?;
        self.round1_wait().await?;
        self.round2().await?;
        self.round2_wait().await?;
        self.construct_secret_share().await
    }

    /// Rebuild the secret share of a member whose `a_0` was derived from a
    /// signer, using only ledger state. The participant must have been built
    /// with [`DkgParticipant::from_signer`] (or the same seed).
    pub async fn recover(mut self) -> Result<CommitteeMember, DkgError> {
        let member_id = self.config.member_id;
        let posted = self.fetch_round1_pk().await?;
        if posted != self.round1_pk() {
            return Err(DkgError::RecoveryMismatch { member_id });
        }
        self.phase = DkgPhase::Round2Posted;
        info!(member_id, "round 1 key matches ledger, recovering share");
        self.round2_wait().await?;
        self.construct_secret_share().await
    }

    async fn fetch_round1_pk(&self) -> Result<Point, DkgError> {
        let encoded = self
            .ledger
            .get_round1_pk_for(self.config.member_id)
            .await
            .map_err(|e| self.ledger_err(e))?;
        Ok(Point::decode(&encoded)?)
    }
}
