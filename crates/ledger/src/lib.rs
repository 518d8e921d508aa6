//! Ledger boundary for the voting engine.
//!
//! The [`Ledger`] trait is everything the off-chain protocol needs from the
//! chain: contract calls for the DKG and voting contracts, state queries and
//! event-log scans. Two implementations are provided:
//!
//! - [`InMemoryLedger`]: connections to a shared in-process chain, used by
//!   tests and hosted by the `mock-chain` server
//! - [`RpcLedger`]: a JSON-RPC client for a running `mock-chain`
//!
//! The contract logic itself lives in [`handlers`] (writes) and [`queries`]
//! (reads) over [`state::ChainState`]. Proofs submitted by members and
//! voters are verified there through the [`zkvote_prover::Prover`] trait.

pub mod descriptor;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod memory;
pub mod poll;
pub mod queries;
pub mod retry;
pub mod rpc;
pub mod state;

#[cfg(test)]
mod testing;

pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
pub use memory::{InMemoryChain, InMemoryLedger};
pub use poll::PollPolicy;
pub use retry::RetryPolicy;
pub use rpc::RpcLedger;
