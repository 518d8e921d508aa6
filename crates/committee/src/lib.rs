//! Committee-member side of threshold voting.
//!
//! - [`keystore`]: the member's signing key file and persisted DKG output
//! - [`tally`]: partial decryption of a proposal's summed ballots
//! - [`orchestrator`]: discovers proposals and tallies them once their
//!   deadline or weight threshold is reached

pub mod keystore;
pub mod orchestrator;
pub mod tally;

#[cfg(test)]
mod testing;

pub use keystore::{generate_key_file, load_signing_key, member_address, KeystoreError, MemberState};
pub use orchestrator::{
    wait_for_votes, Orchestrator, OrchestratorConfig, OrchestratorError, ProposalPhase,
    TickReport, TrackedProposal,
};
pub use tally::{TallyEngine, TallyError, TallyOutcome};
