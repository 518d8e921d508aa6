//! Distributed key generation for the voting committee.
//!
//! Implements a (t, n) Feldman-VSS key generation run against the ledger:
//!
//! 1. Each member draws a polynomial of degree t-1 and publishes its
//!    coefficient commitments
//! 2. Each member encrypts `f(j)` to every member `j` and publishes it with a
//!    proof of correct encryption
//! 3. Each member decrypts its `n` incoming shares and sums them into `sk_i`
//! 4. `sk_i` is checked against the aggregate commitments and the ledger's
//!    published `PK_i`; any mismatch aborts the run
//!
//! The aggregate key is `PK = Σ C_{i,0}`; any `t` members can jointly
//! decrypt under it.

pub mod error;
pub mod feldman;
pub mod participant;
pub mod types;

pub use error::DkgError;
pub use feldman::KeyGenPolynomial;
pub use participant::DkgParticipant;
pub use types::{CommitteeMember, DkgConfig, DkgPhase, Round2Share};
