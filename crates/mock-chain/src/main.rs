//! Mock chain server for local runs of the threshold voting system.
//!
//! Deploys the DKG and voting contracts for a fixed committee, writes their
//! descriptors and serves the ledger over JSON-RPC.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;

use mock_chain::start_server;
use zkvote_ledger::{descriptor, InMemoryChain};
use zkvote_prover::SigmaProver;
use zkvote_types::{parse_address, Address};

#[derive(Parser)]
#[command(name = "mock-chain")]
#[command(about = "In-memory ledger served over JSON-RPC")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9944")]
    listen: SocketAddr,

    /// Committee member addresses (hex), in member id order
    #[arg(long, value_delimiter = ',', required = true)]
    committee: Vec<String>,

    /// Members needed to decrypt
    #[arg(short = 't', long, default_value = "2")]
    threshold: u32,

    /// Upper bound on the total voting weight of a proposal
    #[arg(long, default_value = "1000")]
    max_weight: u64,

    /// Where to write the contract descriptors
    #[arg(long, default_value = "./deployment")]
    descriptor_dir: PathBuf,
}

fn committee_addresses(values: &[String]) -> Result<Vec<Address>> {
    values
        .iter()
        .map(|value| parse_address(value).ok_or_else(|| anyhow!("invalid address: {}", value)))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_chain=info".parse().unwrap())
                .add_directive("jsonrpsee=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let committee = committee_addresses(&cli.committee)?;

    let chain = InMemoryChain::new(Arc::new(SigmaProver::new()));
    let deployment = chain
        .deploy(committee, cli.threshold, cli.max_weight)
        .context("deploying contracts")?;
    let (dkg_path, voting_path) = descriptor::write_deployment(&cli.descriptor_dir, &deployment)
        .context("writing descriptors")?;
    info!(
        n_comm = deployment.dkg.n_comm,
        threshold = deployment.dkg.threshold,
        dkg = %dkg_path.display(),
        voting = %voting_path.display(),
        "contracts deployed"
    );

    let (addr, handle) = start_server(chain, cli.listen).await?;
    info!("Mock chain server running on {}. Press Ctrl+C to stop.", addr);

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
