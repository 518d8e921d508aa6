//! JSON-RPC host for the in-memory ledger.
//!
//! Lets committee members and voters run as separate processes against a
//! single simulated chain.

pub mod server;

pub use server::{start_server, MockChainServer};
