//! Voter-side client for encrypted weighted voting.
//!
//! - [`vote`]: build one-hot ElGamal ballots, prove them and submit them
//! - [`query`]: read proposal state and wait for the committee's tally

pub mod query;
pub mod vote;

pub use query::{proposal_status, wait_for_tally, ProposalStatus, TotalsDisplay};
pub use vote::{cast_vote, encrypt_vote, PreparedVote, VoteError};
