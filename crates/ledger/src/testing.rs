//! Fixtures shared by the ledger's unit tests.

use rand::rngs::OsRng;

use zkvote_crypto::cipher::encrypt;
use zkvote_crypto::curve::encode_field;
use zkvote_crypto::polynomial::{commit, evaluate_scalar};
use zkvote_crypto::{encode_points, partial_decrypt, Ciphertext, Point, Scalar};
use zkvote_prover::{
    prove_statement, NvoteStatement, NvoteWitness, Round2Statement, Round2Witness, SigmaProver,
    TallyStatement, TallyWitness,
};
use zkvote_types::{
    Address, EncodedBallot, EncodedPoint, MemberId, Proof, ProposalId, Round2Submission,
    VoteChoice, VOTE_OPTIONS,
};

use crate::handlers::{handle_deploy, handle_round1, handle_round2, CallContext};
use crate::queries;
use crate::state::ChainState;

pub(crate) const MAX_WEIGHT: u64 = 1000;

/// A committee whose polynomials are known to the test.
pub(crate) struct Committee {
    pub prover: SigmaProver,
    members: Vec<(Address, Vec<Scalar>)>,
}

impl Committee {
    pub fn new(n: u8, threshold: u32) -> Self {
        let members = (1..=n)
            .map(|i| {
                let coeffs = (0..threshold).map(|_| Scalar::random(&mut OsRng)).collect();
                ([i; 32], coeffs)
            })
            .collect();
        Self {
            prover: SigmaProver::new(),
            members,
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.members.iter().map(|(a, _)| *a).collect()
    }

    pub fn deployed(n: u8, threshold: u32) -> (ChainState, Self) {
        let committee = Self::new(n, threshold);
        let mut state = ChainState::new();
        let ctx = Self::admin_context(&state);
        handle_deploy(
            &mut state,
            &ctx,
            committee.addresses(),
            threshold,
            MAX_WEIGHT,
            &committee.prover,
        )
        .unwrap();
        (state, committee)
    }

    pub fn admin_context(state: &ChainState) -> CallContext {
        CallContext {
            sender: [0u8; 32],
            block_number: state.block_number,
        }
    }

    pub fn address(&self, id: MemberId) -> Address {
        self.members[id as usize - 1].0
    }

    pub fn context(&self, state: &ChainState, id: MemberId) -> CallContext {
        CallContext {
            sender: self.address(id),
            block_number: state.block_number,
        }
    }

    fn coefficients(&self, id: MemberId) -> &[Scalar] {
        &self.members[id as usize - 1].1
    }

    pub fn commitments(&self, id: MemberId) -> Vec<EncodedPoint> {
        encode_points(&commit(self.coefficients(id)))
    }

    pub fn submission(&self, sender: MemberId, recipient: MemberId) -> Round2Submission {
        let coeffs = self.coefficients(sender);
        let share = evaluate_scalar(coeffs, &Scalar::from_u64(recipient as u64));
        let recipient_pk = Point::from_scalar(&self.coefficients(recipient)[0]);
        let encryption = encrypt(&share, &recipient_pk, &mut OsRng).unwrap();
        let statement = Round2Statement {
            recipient_id: recipient,
            recipient_pk,
            share_commitment: Point::from_scalar(&share),
            ciphertext: encryption.share.ciphertext,
            ephemeral_pk: encryption.share.ephemeral_pk,
            coefficient_commitments: commit(coeffs),
        };
        let witness = Round2Witness {
            share,
            ephemeral_sk: encryption.ephemeral_sk,
        };
        let proof = prove_statement(&self.prover, &statement, &witness).unwrap();
        Round2Submission {
            recipient_id: recipient,
            ciphertext: encode_field(&statement.ciphertext),
            ephemeral_pk: statement.ephemeral_pk.encode(),
            share_commitment: statement.share_commitment.encode(),
            proof,
        }
    }

    pub fn post_round1(&self, state: &mut ChainState) {
        for id in 1..=self.members.len() as MemberId {
            let ctx = self.context(state, id);
            handle_round1(state, &ctx, &self.commitments(id)).unwrap();
        }
    }

    pub fn run_dkg(&self, state: &mut ChainState) {
        self.post_round1(state);
        let n = self.members.len() as MemberId;
        for sender in 1..=n {
            for recipient in 1..=n {
                let submission = self.submission(sender, recipient);
                let ctx = self.context(state, sender);
                handle_round2(state, &ctx, &submission, &self.prover).unwrap();
            }
        }
    }

    pub fn secret_share(&self, id: MemberId) -> Scalar {
        let x = Scalar::from_u64(id as u64);
        self.members
            .iter()
            .map(|(_, coeffs)| evaluate_scalar(coeffs, &x))
            .sum()
    }

    pub fn public_key(&self) -> Point {
        self.members
            .iter()
            .map(|(_, coeffs)| Point::from_scalar(&coeffs[0]))
            .sum()
    }

    pub fn partial_decryption(
        &self,
        state: &ChainState,
        id: MemberId,
        proposal_id: ProposalId,
    ) -> ([EncodedPoint; VOTE_OPTIONS], Proof) {
        let r = queries::r(state, proposal_id).unwrap();
        let r = [
            Point::decode(&r[0]).unwrap(),
            Point::decode(&r[1]).unwrap(),
            Point::decode(&r[2]).unwrap(),
        ];
        let sk_i = self.secret_share(id);
        let d = [
            partial_decrypt(&sk_i, &r[0]),
            partial_decrypt(&sk_i, &r[1]),
            partial_decrypt(&sk_i, &r[2]),
        ];
        let statement = TallyStatement {
            pk_i: Point::from_scalar(&sk_i),
            r,
            d,
        };
        let proof = prove_statement(&self.prover, &statement, &TallyWitness { sk_i }).unwrap();
        ([d[0].encode(), d[1].encode(), d[2].encode()], proof)
    }
}

/// Encrypt and prove a ballot.
pub(crate) fn ballot_for(
    pk: &Point,
    weight: u64,
    choice: VoteChoice,
    prover: &SigmaProver,
) -> (EncodedBallot, Proof) {
    let randomness = [
        Scalar::random(&mut OsRng),
        Scalar::random(&mut OsRng),
        Scalar::random(&mut OsRng),
    ];
    let cts: Vec<Ciphertext> = (0..VOTE_OPTIONS)
        .map(|k| {
            let value = if k == choice.index() { weight } else { 0 };
            Ciphertext::encrypt(pk, &Scalar::from_u64(value), &randomness[k])
        })
        .collect();
    let statement = NvoteStatement {
        pk: *pk,
        vote_power: weight,
        r: [cts[0].r, cts[1].r, cts[2].r],
        m: [cts[0].m, cts[1].m, cts[2].m],
    };
    let witness = NvoteWitness {
        o: choice.bitmask(),
        randomness,
    };
    let proof = prove_statement(prover, &statement, &witness).unwrap();
    let ballot = EncodedBallot {
        r: [statement.r[0].encode(), statement.r[1].encode(), statement.r[2].encode()],
        m: [statement.m[0].encode(), statement.m[1].encode(), statement.m[2].encode()],
    };
    (ballot, proof)
}
