//! Native sigma-protocol backend.
//!
//! Each circuit relation is proved with a Fiat-Shamir compiled sigma
//! protocol over BabyJubJub. The transcript absorbs the circuit name, every
//! public signal and every statement mask before the challenge is drawn, so
//! a proof is bound to exactly the signals it was produced for.
//!
//! | circuit | relation proved | proof elements |
//! |---|---|---|
//! | `round2` | knowledge of `f_l`, `eph_sk` with `PK_i_l = f_l·G`, `eph_pk = eph_sk·G`; `PK_i_l` lies on the committed polynomial | 6 |
//! | `nvote`  | every `(R_k, M_k)` encrypts `0` or `w`, and the three encrypt `w` in total | 41 |
//! | `tally`  | `PK_i = sk_i·G` and `D_k = sk_i·R_k` for the same `sk_i` | 9 |
//!
//! The Poseidon ciphertext of a round-2 share is checked against the witness
//! at proving time; recipients detect a bad ciphertext through the Feldman
//! check after decryption.

use merlin::Transcript;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::debug;

use zkvote_crypto::cipher::encrypt_with_ephemeral;
use zkvote_crypto::{evaluate_group, Point, Scalar};
use zkvote_types::{Proof, PublicSignals, VoteChoice, VOTE_OPTIONS};

use crate::circuits::{
    Circuit, FieldReader, FieldWriter, NvoteStatement, NvoteWitness, PrivateInputs,
    Round2Statement, Round2Witness, Source, Statement, TallyStatement, TallyWitness,
    VerificationKey, Witness,
};
use crate::error::ProverError;
use crate::Prover;

const TRANSCRIPT_LABEL: &[u8] = b"zkvote-sigma-v1";

/// Proves and verifies the three protocol relations natively.
#[derive(Clone, Copy, Debug, Default)]
pub struct SigmaProver;

impl SigmaProver {
    pub fn new() -> Self {
        Self
    }
}

impl Prover for SigmaProver {
    fn prove(
        &self,
        circuit: Circuit,
        public: &PublicSignals,
        private: &PrivateInputs,
    ) -> Result<(Proof, PublicSignals), ProverError> {
        let mut rng = OsRng;
        let proof = match circuit {
            Circuit::Round2 => prove_round2(
                &Round2Statement::from_signals(public)?,
                &Round2Witness::from_private(private)?,
                &mut rng,
            )?,
            Circuit::Nvote => prove_nvote(
                &NvoteStatement::from_signals(public)?,
                &NvoteWitness::from_private(private)?,
                &mut rng,
            )?,
            Circuit::Tally => prove_tally(
                &TallyStatement::from_signals(public)?,
                &TallyWitness::from_private(private)?,
                &mut rng,
            )?,
        };
        Ok((proof, public.clone()))
    }

    fn verification_key(&self, circuit: Circuit) -> VerificationKey {
        VerificationKey {
            circuit,
            digest: key_digest(circuit),
        }
    }

    fn verify(&self, key: &VerificationKey, public: &PublicSignals, proof: &Proof) -> bool {
        if key.digest != key_digest(key.circuit) {
            debug!(circuit = %key.circuit, "unknown verification key");
            return false;
        }
        let result = match key.circuit {
            Circuit::Round2 => Round2Statement::from_signals(public)
                .and_then(|s| verify_round2(&s, public, proof)),
            Circuit::Nvote => {
                NvoteStatement::from_signals(public).and_then(|s| verify_nvote(&s, public, proof))
            }
            Circuit::Tally => {
                TallyStatement::from_signals(public).and_then(|s| verify_tally(&s, public, proof))
            }
        };
        match result {
            Ok(valid) => valid,
            Err(e) => {
                debug!(circuit = %key.circuit, error = %e, "rejecting malformed proof input");
                false
            }
        }
    }
}

fn key_digest(circuit: Circuit) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(TRANSCRIPT_LABEL);
    hasher.update(b"/");
    hasher.update(circuit.name().as_bytes());
    hasher.finalize().into()
}

// =========================
// TRANSCRIPT
// =========================

struct ProofTranscript(Transcript);

impl ProofTranscript {
    fn new(circuit: Circuit, public: &PublicSignals) -> Self {
        let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
        transcript.append_message(b"circuit", circuit.name().as_bytes());
        transcript.append_u64(b"signal count", public.0.len() as u64);
        for signal in &public.0 {
            transcript.append_message(b"signal", signal.as_str().as_bytes());
        }
        Self(transcript)
    }

    fn append_point(&mut self, label: &'static [u8], point: &Point) {
        let encoded = point.encode();
        self.0.append_message(label, encoded.x().as_str().as_bytes());
        self.0.append_message(label, encoded.y().as_str().as_bytes());
    }

    fn challenge(&mut self) -> Scalar {
        let mut buf = [0u8; 64];
        self.0.challenge_bytes(b"challenge", &mut buf);
        Scalar::from_be_bytes_mod_order(&buf)
    }
}

fn unsatisfied(circuit: Circuit, reason: &str) -> ProverError {
    ProverError::UnsatisfiedWitness {
        circuit,
        reason: reason.to_string(),
    }
}

// =========================
// ROUND 2
// =========================

fn prove_round2<R: RngCore + CryptoRng>(
    statement: &Round2Statement,
    witness: &Round2Witness,
    rng: &mut R,
) -> Result<Proof, ProverError> {
    let circuit = Circuit::Round2;
    if Point::from_scalar(&witness.share) != statement.share_commitment {
        return Err(unsatisfied(circuit, "PK_i_l is not f_l·G"));
    }
    let expected = evaluate_group(
        &statement.coefficient_commitments,
        &Scalar::from_u64(statement.recipient_id as u64),
    );
    if expected != statement.share_commitment {
        return Err(unsatisfied(circuit, "share is not on the committed polynomial"));
    }
    let encrypted = encrypt_with_ephemeral(
        &witness.share,
        &statement.recipient_pk,
        &witness.ephemeral_sk,
    )?;
    if encrypted.ephemeral_pk != statement.ephemeral_pk {
        return Err(unsatisfied(circuit, "eph_pk is not eph_sk·G"));
    }
    if encrypted.ciphertext != statement.ciphertext {
        return Err(unsatisfied(circuit, "enc does not decrypt to f_l"));
    }

    let k_share = Scalar::random(rng);
    let k_ephemeral = Scalar::random(rng);
    let t_share = Point::from_scalar(&k_share);
    let t_ephemeral = Point::from_scalar(&k_ephemeral);

    let mut transcript = ProofTranscript::new(circuit, &statement.to_signals());
    transcript.append_point(b"mask", &t_share);
    transcript.append_point(b"mask", &t_ephemeral);
    let c = transcript.challenge();

    let mut w = FieldWriter::default();
    w.point(&t_share)
        .point(&t_ephemeral)
        .scalar(&(k_share + c * witness.share))
        .scalar(&(k_ephemeral + c * witness.ephemeral_sk));
    Ok(Proof {
        elements: w.finish(),
    })
}

fn verify_round2(
    statement: &Round2Statement,
    public: &PublicSignals,
    proof: &Proof,
) -> Result<bool, ProverError> {
    let mut r = FieldReader::new(Circuit::Round2, Source::Proof, &proof.elements);
    let t_share = r.point()?;
    let t_ephemeral = r.point()?;
    let z_share = r.scalar()?;
    let z_ephemeral = r.scalar()?;
    r.finish()?;

    let expected = evaluate_group(
        &statement.coefficient_commitments,
        &Scalar::from_u64(statement.recipient_id as u64),
    );
    if expected != statement.share_commitment {
        return Ok(false);
    }

    let mut transcript = ProofTranscript::new(Circuit::Round2, public);
    transcript.append_point(b"mask", &t_share);
    transcript.append_point(b"mask", &t_ephemeral);
    let c = transcript.challenge();

    Ok(Point::from_scalar(&z_share) == t_share + statement.share_commitment * c
        && Point::from_scalar(&z_ephemeral) == t_ephemeral + statement.ephemeral_pk * c)
}

// =========================
// NVOTE
// =========================

/// Prover state of one disjunction before the challenge is known.
struct PendingOr {
    real: usize,
    nonce: Scalar,
    sim_challenge: Scalar,
    sim_response: Scalar,
    a: [Point; 2],
    b: [Point; 2],
}

/// `M_k - j·w·G` for the two admissible plaintexts `j ∈ {0, 1}`.
fn branch_targets(m: &Point, weight_point: &Point) -> [Point; 2] {
    [*m, *m - *weight_point]
}

fn prove_nvote<R: RngCore + CryptoRng>(
    statement: &NvoteStatement,
    witness: &NvoteWitness,
    rng: &mut R,
) -> Result<Proof, ProverError> {
    let circuit = Circuit::Nvote;
    let choice = VoteChoice::from_bitmask(witness.o)
        .ok_or_else(|| unsatisfied(circuit, "o is not one-hot"))?;
    let weight_point = Point::from_scalar(&Scalar::from_u64(statement.vote_power));

    let mut pending = Vec::with_capacity(VOTE_OPTIONS);
    for k in 0..VOTE_OPTIONS {
        let r_k = witness.randomness[k];
        let bit = usize::from(k == choice.index());
        if Point::from_scalar(&r_k) != statement.r[k] {
            return Err(unsatisfied(circuit, "R_k is not r_k·G"));
        }
        let targets = branch_targets(&statement.m[k], &weight_point);
        if statement.pk.scalar_mul(&r_k) != targets[bit] {
            return Err(unsatisfied(circuit, "M_k is not r_k·PK + o_k·w·G"));
        }

        let real = bit;
        let sim = 1 - bit;
        let nonce = Scalar::random(rng);
        let sim_challenge = Scalar::random(rng);
        let sim_response = Scalar::random(rng);
        let mut a = [Point::identity(); 2];
        let mut b = [Point::identity(); 2];
        a[real] = Point::from_scalar(&nonce);
        b[real] = statement.pk.scalar_mul(&nonce);
        a[sim] = Point::from_scalar(&sim_response) - statement.r[k] * sim_challenge;
        b[sim] = statement.pk.scalar_mul(&sim_response) - targets[sim] * sim_challenge;
        pending.push(PendingOr {
            real,
            nonce,
            sim_challenge,
            sim_response,
            a,
            b,
        });
    }

    let rho: Scalar = witness.randomness.iter().copied().sum();
    let sum_nonce = Scalar::random(rng);
    let t_g = Point::from_scalar(&sum_nonce);
    let t_pk = statement.pk.scalar_mul(&sum_nonce);

    let mut transcript = ProofTranscript::new(circuit, &statement.to_signals());
    for p in &pending {
        for j in 0..2 {
            transcript.append_point(b"or mask", &p.a[j]);
            transcript.append_point(b"or mask", &p.b[j]);
        }
    }
    transcript.append_point(b"sum mask", &t_g);
    transcript.append_point(b"sum mask", &t_pk);
    let c = transcript.challenge();

    let mut w = FieldWriter::default();
    for (k, p) in pending.iter().enumerate() {
        let mut challenges = [Scalar::zero(); 2];
        let mut responses = [Scalar::zero(); 2];
        challenges[p.real] = c - p.sim_challenge;
        responses[p.real] = p.nonce + challenges[p.real] * witness.randomness[k];
        challenges[1 - p.real] = p.sim_challenge;
        responses[1 - p.real] = p.sim_response;

        w.point(&p.a[0]).point(&p.b[0]).point(&p.a[1]).point(&p.b[1]);
        w.scalar(&challenges[0]).scalar(&challenges[1]);
        w.scalar(&responses[0]).scalar(&responses[1]);
    }
    w.point(&t_g).point(&t_pk).scalar(&(sum_nonce + c * rho));
    Ok(Proof {
        elements: w.finish(),
    })
}

struct OrProof {
    a: [Point; 2],
    b: [Point; 2],
    c: [Scalar; 2],
    z: [Scalar; 2],
}

fn verify_nvote(
    statement: &NvoteStatement,
    public: &PublicSignals,
    proof: &Proof,
) -> Result<bool, ProverError> {
    let mut r = FieldReader::new(Circuit::Nvote, Source::Proof, &proof.elements);
    let mut ors = Vec::with_capacity(VOTE_OPTIONS);
    for _ in 0..VOTE_OPTIONS {
        let (a0, b0, a1, b1) = (r.point()?, r.point()?, r.point()?, r.point()?);
        let c = [r.scalar()?, r.scalar()?];
        let z = [r.scalar()?, r.scalar()?];
        ors.push(OrProof {
            a: [a0, a1],
            b: [b0, b1],
            c,
            z,
        });
    }
    let t_g = r.point()?;
    let t_pk = r.point()?;
    let z_sum = r.scalar()?;
    r.finish()?;

    let mut transcript = ProofTranscript::new(Circuit::Nvote, public);
    for or in &ors {
        for j in 0..2 {
            transcript.append_point(b"or mask", &or.a[j]);
            transcript.append_point(b"or mask", &or.b[j]);
        }
    }
    transcript.append_point(b"sum mask", &t_g);
    transcript.append_point(b"sum mask", &t_pk);
    let c = transcript.challenge();

    let weight_point = Point::from_scalar(&Scalar::from_u64(statement.vote_power));
    for (k, or) in ors.iter().enumerate() {
        if or.c[0] + or.c[1] != c {
            return Ok(false);
        }
        let targets = branch_targets(&statement.m[k], &weight_point);
        for j in 0..2 {
            if Point::from_scalar(&or.z[j]) != or.a[j] + statement.r[k] * or.c[j] {
                return Ok(false);
            }
            if statement.pk.scalar_mul(&or.z[j]) != or.b[j] + targets[j] * or.c[j] {
                return Ok(false);
            }
        }
    }

    let r_sum: Point = statement.r.iter().copied().sum();
    let m_sum: Point = statement.m.iter().copied().sum();
    Ok(Point::from_scalar(&z_sum) == t_g + r_sum * c
        && statement.pk.scalar_mul(&z_sum) == t_pk + (m_sum - weight_point) * c)
}

// =========================
// TALLY
// =========================

fn tally_bases(statement: &TallyStatement) -> [(Point, Point); VOTE_OPTIONS + 1] {
    [
        (Point::generator(), statement.pk_i),
        (statement.r[0], statement.d[0]),
        (statement.r[1], statement.d[1]),
        (statement.r[2], statement.d[2]),
    ]
}

fn prove_tally<R: RngCore + CryptoRng>(
    statement: &TallyStatement,
    witness: &TallyWitness,
    rng: &mut R,
) -> Result<Proof, ProverError> {
    let circuit = Circuit::Tally;
    let pairs = tally_bases(statement);
    if pairs
        .iter()
        .any(|(base, target)| base.scalar_mul(&witness.sk_i) != *target)
    {
        return Err(unsatisfied(circuit, "D_i is not sk_i·R for the key behind PK_i"));
    }

    let nonce = Scalar::random(rng);
    let masks: Vec<Point> = pairs.iter().map(|(base, _)| base.scalar_mul(&nonce)).collect();

    let mut transcript = ProofTranscript::new(circuit, &statement.to_signals());
    for mask in &masks {
        transcript.append_point(b"mask", mask);
    }
    let c = transcript.challenge();

    let mut w = FieldWriter::default();
    w.points(&masks).scalar(&(nonce + c * witness.sk_i));
    Ok(Proof {
        elements: w.finish(),
    })
}

fn verify_tally(
    statement: &TallyStatement,
    public: &PublicSignals,
    proof: &Proof,
) -> Result<bool, ProverError> {
    let mut r = FieldReader::new(Circuit::Tally, Source::Proof, &proof.elements);
    let mut masks = Vec::with_capacity(VOTE_OPTIONS + 1);
    for _ in 0..=VOTE_OPTIONS {
        masks.push(r.point()?);
    }
    let z = r.scalar()?;
    r.finish()?;

    let mut transcript = ProofTranscript::new(Circuit::Tally, public);
    for mask in &masks {
        transcript.append_point(b"mask", mask);
    }
    let c = transcript.challenge();

    Ok(tally_bases(statement)
        .iter()
        .zip(&masks)
        .all(|((base, target), mask)| base.scalar_mul(&z) == *mask + *target * c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{prove_statement, verify_statement};
    use zkvote_crypto::cipher::encrypt;
    use zkvote_crypto::elgamal::{partial_decrypt, Ciphertext};
    use zkvote_crypto::polynomial::{commit, evaluate_scalar};
    use zkvote_types::FieldElement;

    fn random_scalar() -> Scalar {
        Scalar::random(&mut OsRng)
    }

    fn round2_fixture() -> (Round2Statement, Round2Witness) {
        let coefficients = vec![random_scalar(), random_scalar()];
        let recipient_sk = random_scalar();
        let recipient_pk = Point::from_scalar(&recipient_sk);
        let share = evaluate_scalar(&coefficients, &Scalar::from_u64(3));
        let encryption = encrypt(&share, &recipient_pk, &mut OsRng).unwrap();
        let statement = Round2Statement {
            recipient_id: 3,
            recipient_pk,
            share_commitment: Point::from_scalar(&share),
            ciphertext: encryption.share.ciphertext,
            ephemeral_pk: encryption.share.ephemeral_pk,
            coefficient_commitments: commit(&coefficients),
        };
        let witness = Round2Witness {
            share,
            ephemeral_sk: encryption.ephemeral_sk,
        };
        (statement, witness)
    }

    fn nvote_fixture(choice: VoteChoice, weight: u64) -> (NvoteStatement, NvoteWitness) {
        let pk = Point::from_scalar(&random_scalar());
        let randomness = [random_scalar(), random_scalar(), random_scalar()];
        let ciphertexts: Vec<Ciphertext> = (0..VOTE_OPTIONS)
            .map(|k| {
                let value = if k == choice.index() { weight } else { 0 };
                Ciphertext::encrypt(&pk, &Scalar::from_u64(value), &randomness[k])
            })
            .collect();
        let statement = NvoteStatement {
            pk,
            vote_power: weight,
            r: [ciphertexts[0].r, ciphertexts[1].r, ciphertexts[2].r],
            m: [ciphertexts[0].m, ciphertexts[1].m, ciphertexts[2].m],
        };
        let witness = NvoteWitness {
            o: choice.bitmask(),
            randomness,
        };
        (statement, witness)
    }

    fn tally_fixture() -> (TallyStatement, TallyWitness) {
        let sk_i = random_scalar();
        let r = [
            Point::from_scalar(&random_scalar()),
            Point::from_scalar(&random_scalar()),
            Point::from_scalar(&random_scalar()),
        ];
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
        (statement, TallyWitness { sk_i })
    }

    fn check<S: Statement, W: Witness>(statement: &S, witness: &W) -> (Proof, bool) {
        let prover = SigmaProver::new();
        let proof = prove_statement(&prover, statement, witness).unwrap();
        let key = prover.verification_key(S::CIRCUIT);
        let valid = verify_statement(&prover, &key, statement, &proof).unwrap();
        (proof, valid)
    }

    #[test]
    fn test_round2_proof_verifies() {
        let (statement, witness) = round2_fixture();
        let (proof, valid) = check(&statement, &witness);
        assert!(valid);
        assert_eq!(proof.elements.len(), 6);
    }

    #[test]
    fn test_round2_rejects_wrong_recipient_id() {
        let (mut statement, witness) = round2_fixture();
        let prover = SigmaProver::new();
        let proof = prove_statement(&prover, &statement, &witness).unwrap();
        statement.recipient_id = 2;
        let key = prover.verification_key(Circuit::Round2);
        assert!(!verify_statement(&prover, &key, &statement, &proof).unwrap());
    }

    #[test]
    fn test_round2_rejects_bad_ciphertext_witness() {
        let (mut statement, witness) = round2_fixture();
        statement.ciphertext += zkvote_crypto::BaseField::from(1u64);
        let result = prove_statement(&SigmaProver::new(), &statement, &witness);
        assert!(matches!(
            result,
            Err(ProverError::UnsatisfiedWitness { circuit: Circuit::Round2, .. })
        ));
    }

    #[test]
    fn test_nvote_proof_verifies_for_every_choice() {
        for choice in VoteChoice::ALL {
            let (statement, witness) = nvote_fixture(choice, 5);
            let (proof, valid) = check(&statement, &witness);
            assert!(valid, "{} ballot should verify", choice);
            assert_eq!(proof.elements.len(), 41);
        }
    }

    #[test]
    fn test_nvote_rejects_inflated_weight() {
        let (mut statement, witness) = nvote_fixture(VoteChoice::Yay, 5);
        let prover = SigmaProver::new();
        let proof = prove_statement(&prover, &statement, &witness).unwrap();
        statement.vote_power = 6;
        let key = prover.verification_key(Circuit::Nvote);
        assert!(!verify_statement(&prover, &key, &statement, &proof).unwrap());
    }

    #[test]
    fn test_nvote_rejects_double_vote_witness() {
        let (statement, mut witness) = nvote_fixture(VoteChoice::Nay, 3);
        witness.o = 0b110;
        let result = prove_statement(&SigmaProver::new(), &statement, &witness);
        assert!(matches!(
            result,
            Err(ProverError::UnsatisfiedWitness { circuit: Circuit::Nvote, .. })
        ));
    }

    #[test]
    fn test_nvote_rejects_ballot_encrypting_two_weights() {
        // A prover that lies about the ciphertext cannot produce a proof.
        let (mut statement, witness) = nvote_fixture(VoteChoice::Abstain, 4);
        statement.m[2] += Point::from_scalar(&Scalar::from_u64(4));
        let result = prove_statement(&SigmaProver::new(), &statement, &witness);
        assert!(result.is_err());
    }

    #[test]
    fn test_tally_proof_verifies() {
        let (statement, witness) = tally_fixture();
        let (proof, valid) = check(&statement, &witness);
        assert!(valid);
        assert_eq!(proof.elements.len(), 9);
    }

    #[test]
    fn test_tally_rejects_swapped_decryption() {
        let (mut statement, witness) = tally_fixture();
        let prover = SigmaProver::new();
        let proof = prove_statement(&prover, &statement, &witness).unwrap();
        statement.d.swap(0, 1);
        let key = prover.verification_key(Circuit::Tally);
        assert!(!verify_statement(&prover, &key, &statement, &proof).unwrap());
    }

    #[test]
    fn test_tampered_proof_element_rejected() {
        let (statement, witness) = tally_fixture();
        let prover = SigmaProver::new();
        let mut proof = prove_statement(&prover, &statement, &witness).unwrap();
        let last = proof.elements.len() - 1;
        proof.elements[last] = FieldElement::from(1u64);
        let key = prover.verification_key(Circuit::Tally);
        assert!(!prover.verify(&key, &statement.to_signals(), &proof));
    }

    #[test]
    fn test_garbage_proof_rejected_without_panic() {
        let (statement, _) = tally_fixture();
        let prover = SigmaProver::new();
        let key = prover.verification_key(Circuit::Tally);
        let proof = Proof {
            elements: vec![FieldElement::new("not a number")],
        };
        assert!(!prover.verify(&key, &statement.to_signals(), &proof));
    }

    #[test]
    fn test_key_for_other_circuit_rejected() {
        let (statement, witness) = tally_fixture();
        let prover = SigmaProver::new();
        let proof = prove_statement(&prover, &statement, &witness).unwrap();
        let key = prover.verification_key(Circuit::Nvote);
        assert!(matches!(
            verify_statement(&prover, &key, &statement, &proof),
            Err(ProverError::KeyMismatch { .. })
        ));
    }
}
