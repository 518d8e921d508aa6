//! Circuit identifiers and the layout of their public and private inputs.
//!
//! Public signals are flat vectors of decimal-string field elements in the
//! order the circuits declare them; points contribute their `x` then `y`
//! coordinate. The layouts are:
//!
//! | circuit | public | private |
//! |---|---|---|
//! | `round2` | `recip_id, recip_PK, PK_i_l, enc, eph_pk, C[t]` | `f_l, eph_sk` |
//! | `nvote`  | `PK, votePower, R[3], M[3]` | `o, r[3]` |
//! | `tally`  | `PK_i, R[3], D_i[3]` | `sk_i` |

use std::fmt;

use serde::{Deserialize, Serialize};

use zkvote_crypto::curve::{decode_field, encode_field};
use zkvote_crypto::{BaseField, Point, Scalar};
use zkvote_types::{FieldElement, PublicSignals, VOTE_OPTIONS};

use crate::error::ProverError;

/// The circuits consumed by the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Circuit {
    Round2,
    Nvote,
    Tally,
}

impl Circuit {
    pub fn name(self) -> &'static str {
        match self {
            Circuit::Round2 => "round2",
            Circuit::Nvote => "nvote",
            Circuit::Tally => "tally",
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies the verifier parameters of one circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub circuit: Circuit,
    pub digest: [u8; 32],
}

/// Private (witness) inputs of a circuit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrivateInputs(pub Vec<FieldElement>);

/// Typed public inputs of one circuit.
pub trait Statement: Sized {
    const CIRCUIT: Circuit;

    fn to_signals(&self) -> PublicSignals;

    fn from_signals(signals: &PublicSignals) -> Result<Self, ProverError>;
}

/// Typed private inputs of one circuit.
pub trait Witness: Sized {
    const CIRCUIT: Circuit;

    fn to_private(&self) -> PrivateInputs;

    fn from_private(inputs: &PrivateInputs) -> Result<Self, ProverError>;
}

// =========================
// ENCODING HELPERS
// =========================

/// Appends typed values as field elements.
#[derive(Default)]
pub(crate) struct FieldWriter(Vec<FieldElement>);

impl FieldWriter {
    pub fn point(&mut self, p: &Point) -> &mut Self {
        let encoded = p.encode();
        self.0.extend(encoded.0);
        self
    }

    pub fn points(&mut self, ps: &[Point]) -> &mut Self {
        for p in ps {
            self.point(p);
        }
        self
    }

    pub fn scalar(&mut self, s: &Scalar) -> &mut Self {
        self.0.push(s.encode());
        self
    }

    pub fn base(&mut self, f: &BaseField) -> &mut Self {
        self.0.push(encode_field(f));
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.0.push(FieldElement::from(v));
        self
    }

    pub fn finish(&mut self) -> Vec<FieldElement> {
        std::mem::take(&mut self.0)
    }
}

/// What a [`FieldReader`] is parsing, for error reporting.
#[derive(Clone, Copy)]
pub(crate) enum Source {
    Signals,
    Private,
    Proof,
}

/// Reads typed values back out of a field-element vector.
pub(crate) struct FieldReader<'a> {
    circuit: Circuit,
    source: Source,
    items: &'a [FieldElement],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(circuit: Circuit, source: Source, items: &'a [FieldElement]) -> Self {
        Self {
            circuit,
            source,
            items,
            pos: 0,
        }
    }

    pub fn error(&self, reason: impl Into<String>) -> ProverError {
        let circuit = self.circuit;
        let reason = reason.into();
        match self.source {
            Source::Signals => ProverError::MalformedSignals { circuit, reason },
            Source::Private => ProverError::MalformedPrivateInputs { circuit, reason },
            Source::Proof => ProverError::MalformedProof { circuit, reason },
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.pos
    }

    fn next(&mut self) -> Result<&'a FieldElement, ProverError> {
        let item = self
            .items
            .get(self.pos)
            .ok_or_else(|| self.error(format!("expected more than {} elements", self.pos)))?;
        self.pos += 1;
        Ok(item)
    }

    pub fn base(&mut self) -> Result<BaseField, ProverError> {
        let item = self.next()?;
        decode_field(item).map_err(|e| self.error(e.to_string()))
    }

    pub fn scalar(&mut self) -> Result<Scalar, ProverError> {
        let item = self.next()?;
        Scalar::decode(item).map_err(|e| self.error(e.to_string()))
    }

    pub fn u64(&mut self) -> Result<u64, ProverError> {
        let item = self.next()?;
        item.as_str()
            .parse()
            .map_err(|_| self.error(format!("not a u64: {}", item)))
    }

    pub fn point(&mut self) -> Result<Point, ProverError> {
        let x = self.next()?.clone();
        let y = self.next()?.clone();
        Point::decode(&zkvote_types::EncodedPoint::new(x, y)).map_err(|e| self.error(e.to_string()))
    }

    pub fn point_array(&mut self) -> Result<[Point; VOTE_OPTIONS], ProverError> {
        Ok([self.point()?, self.point()?, self.point()?])
    }

    pub fn finish(self) -> Result<(), ProverError> {
        if self.remaining() != 0 {
            return Err(self.error(format!("{} trailing elements", self.remaining())));
        }
        Ok(())
    }
}

// =========================
// ROUND 2
// =========================

/// Public inputs proving a round-2 share was encrypted to the right member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Round2Statement {
    pub recipient_id: u32,
    pub recipient_pk: Point,
    /// `PK_i_l = f_i(l)·G`
    pub share_commitment: Point,
    pub ciphertext: BaseField,
    pub ephemeral_pk: Point,
    /// Sender's round-1 coefficient commitments `C_0..C_{t-1}`
    pub coefficient_commitments: Vec<Point>,
}

impl Statement for Round2Statement {
    const CIRCUIT: Circuit = Circuit::Round2;

    fn to_signals(&self) -> PublicSignals {
        let mut w = FieldWriter::default();
        w.u64(self.recipient_id as u64)
            .point(&self.recipient_pk)
            .point(&self.share_commitment)
            .base(&self.ciphertext)
            .point(&self.ephemeral_pk)
            .points(&self.coefficient_commitments);
        PublicSignals(w.finish())
    }

    fn from_signals(signals: &PublicSignals) -> Result<Self, ProverError> {
        let mut r = FieldReader::new(Self::CIRCUIT, Source::Signals, &signals.0);
        let recipient_id = u32::try_from(r.u64()?).map_err(|_| r.error("recipient id overflows u32"))?;
        let recipient_pk = r.point()?;
        let share_commitment = r.point()?;
        let ciphertext = r.base()?;
        let ephemeral_pk = r.point()?;
        if r.remaining() == 0 || r.remaining() % 2 != 0 {
            return Err(r.error("coefficient commitments must be a non-empty list of points"));
        }
        let mut coefficient_commitments = Vec::with_capacity(r.remaining() / 2);
        while r.remaining() > 0 {
            coefficient_commitments.push(r.point()?);
        }
        r.finish()?;
        Ok(Self {
            recipient_id,
            recipient_pk,
            share_commitment,
            ciphertext,
            ephemeral_pk,
            coefficient_commitments,
        })
    }
}

/// Private inputs of the round-2 circuit.
#[derive(Clone, Debug)]
pub struct Round2Witness {
    pub share: Scalar,
    pub ephemeral_sk: Scalar,
}

impl Witness for Round2Witness {
    const CIRCUIT: Circuit = Circuit::Round2;

    fn to_private(&self) -> PrivateInputs {
        let mut w = FieldWriter::default();
        w.scalar(&self.share).scalar(&self.ephemeral_sk);
        PrivateInputs(w.finish())
    }

    fn from_private(inputs: &PrivateInputs) -> Result<Self, ProverError> {
        let mut r = FieldReader::new(Self::CIRCUIT, Source::Private, &inputs.0);
        let share = r.scalar()?;
        let ephemeral_sk = r.scalar()?;
        r.finish()?;
        Ok(Self {
            share,
            ephemeral_sk,
        })
    }
}

// =========================
// NVOTE
// =========================

/// Public inputs of a weighted ballot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NvoteStatement {
    pub pk: Point,
    pub vote_power: u64,
    pub r: [Point; VOTE_OPTIONS],
    pub m: [Point; VOTE_OPTIONS],
}

impl Statement for NvoteStatement {
    const CIRCUIT: Circuit = Circuit::Nvote;

    fn to_signals(&self) -> PublicSignals {
        let mut w = FieldWriter::default();
        w.point(&self.pk)
            .u64(self.vote_power)
            .points(&self.r)
            .points(&self.m);
        PublicSignals(w.finish())
    }

    fn from_signals(signals: &PublicSignals) -> Result<Self, ProverError> {
        let mut r = FieldReader::new(Self::CIRCUIT, Source::Signals, &signals.0);
        let pk = r.point()?;
        let vote_power = r.u64()?;
        let rs = r.point_array()?;
        let ms = r.point_array()?;
        r.finish()?;
        Ok(Self {
            pk,
            vote_power,
            r: rs,
            m: ms,
        })
    }
}

/// Private inputs of the ballot circuit: the one-hot selector and randomness.
#[derive(Clone, Debug)]
pub struct NvoteWitness {
    /// Bitmask, Yay = 0b100, Nay = 0b010, Abstain = 0b001
    pub o: u8,
    pub randomness: [Scalar; VOTE_OPTIONS],
}

impl Witness for NvoteWitness {
    const CIRCUIT: Circuit = Circuit::Nvote;

    fn to_private(&self) -> PrivateInputs {
        let mut w = FieldWriter::default();
        w.u64(self.o as u64);
        for r in &self.randomness {
            w.scalar(r);
        }
        PrivateInputs(w.finish())
    }

    fn from_private(inputs: &PrivateInputs) -> Result<Self, ProverError> {
        let mut r = FieldReader::new(Self::CIRCUIT, Source::Private, &inputs.0);
        let o = u8::try_from(r.u64()?).map_err(|_| r.error("selector overflows u8"))?;
        let randomness = [r.scalar()?, r.scalar()?, r.scalar()?];
        r.finish()?;
        Ok(Self { o, randomness })
    }
}

// =========================
// TALLY
// =========================

/// Public inputs of a partial decryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallyStatement {
    pub pk_i: Point,
    pub r: [Point; VOTE_OPTIONS],
    pub d: [Point; VOTE_OPTIONS],
}

impl Statement for TallyStatement {
    const CIRCUIT: Circuit = Circuit::Tally;

    fn to_signals(&self) -> PublicSignals {
        let mut w = FieldWriter::default();
        w.point(&self.pk_i).points(&self.r).points(&self.d);
        PublicSignals(w.finish())
    }

    fn from_signals(signals: &PublicSignals) -> Result<Self, ProverError> {
        let mut r = FieldReader::new(Self::CIRCUIT, Source::Signals, &signals.0);
        let pk_i = r.point()?;
        let rs = r.point_array()?;
        let d = r.point_array()?;
        r.finish()?;
        Ok(Self { pk_i, r: rs, d })
    }
}

/// Private input of the tally circuit.
#[derive(Clone, Debug)]
pub struct TallyWitness {
    pub sk_i: Scalar,
}

impl Witness for TallyWitness {
    const CIRCUIT: Circuit = Circuit::Tally;

    fn to_private(&self) -> PrivateInputs {
        let mut w = FieldWriter::default();
        w.scalar(&self.sk_i);
        PrivateInputs(w.finish())
    }

    fn from_private(inputs: &PrivateInputs) -> Result<Self, ProverError> {
        let mut r = FieldReader::new(Self::CIRCUIT, Source::Private, &inputs.0);
        let sk_i = r.scalar()?;
        r.finish()?;
        Ok(Self { sk_i })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn random_point() -> Point {
        Point::from_scalar(&Scalar::random(&mut OsRng))
    }

    #[test]
    fn test_signal_lengths_match_circuits() {
        let nvote = NvoteStatement {
            pk: random_point(),
            vote_power: 5,
            r: [random_point(), random_point(), random_point()],
            m: [random_point(), random_point(), random_point()],
        };
        assert_eq!(nvote.to_signals().0.len(), 2 + 1 + 2 * 3 + 2 * 3);

        let tally = TallyStatement {
            pk_i: random_point(),
            r: nvote.r,
            d: nvote.m,
        };
        assert_eq!(tally.to_signals().0.len(), 2 + 2 * 3 + 2 * 3);

        let round2 = Round2Statement {
            recipient_id: 2,
            recipient_pk: random_point(),
            share_commitment: random_point(),
            ciphertext: BaseField::from(99u64),
            ephemeral_pk: random_point(),
            coefficient_commitments: vec![random_point(), random_point()],
        };
        let signals = round2.to_signals();
        assert_eq!(signals.0.len(), 8 + 2 * 2);
        assert_eq!(signals.0[0].as_str(), "2");
        assert_eq!(Round2Statement::from_signals(&signals).unwrap(), round2);
    }

    #[test]
    fn test_circuit_names() {
        assert_eq!(Circuit::Round2.to_string(), "round2");
        assert_eq!(serde_json::to_string(&Circuit::Nvote).unwrap(), "\"nvote\"");
        let parsed: Circuit = serde_json::from_str("\"tally\"").unwrap();
        assert_eq!(parsed, Circuit::Tally);
    }

    #[test]
    fn test_truncated_signals_rejected() {
        let tally = TallyStatement {
            pk_i: random_point(),
            r: [random_point(), random_point(), random_point()],
            d: [random_point(), random_point(), random_point()],
        };
        let mut signals = tally.to_signals();
        signals.0.pop();
        assert!(matches!(
            TallyStatement::from_signals(&signals),
            Err(ProverError::MalformedSignals { circuit: Circuit::Tally, .. })
        ));
    }

    #[test]
    fn test_round2_requires_commitments() {
        let round2 = Round2Statement {
            recipient_id: 1,
            recipient_pk: random_point(),
            share_commitment: random_point(),
            ciphertext: BaseField::from(1u64),
            ephemeral_pk: random_point(),
            coefficient_commitments: vec![],
        };
        assert!(Round2Statement::from_signals(&round2.to_signals()).is_err());
    }
}
