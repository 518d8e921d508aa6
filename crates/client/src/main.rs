//! `voter`: CLI for registering voters, opening proposals and casting
//! encrypted ballots against a mock chain.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::info;

use zkvote_client::{cast_vote, proposal_status, wait_for_tally, TotalsDisplay};
use zkvote_ledger::{descriptor, Ledger, PollPolicy, RetryPolicy, RpcLedger};
use zkvote_prover::SigmaProver;
use zkvote_types::{format_address, parse_address, Address, ProposalId, VoteChoice};

#[derive(Parser)]
#[command(name = "voter")]
#[command(about = "Cast encrypted weighted votes")]
struct Cli {
    /// Mock chain RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:9944")]
    rpc: String,

    /// Sender address (hex)
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000000000000000000000000000")]
    sender: String,

    /// Voting contract descriptor to check the endpoint against
    #[arg(long)]
    voting_descriptor: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a voter with a voting weight
    Register {
        /// Voter address (hex)
        #[arg(long)]
        voter: String,

        #[arg(long)]
        weight: u64,
    },

    /// Open a proposal for voting
    SetupVote {
        #[arg(long)]
        proposal_id: ProposalId,

        /// Number of blocks the vote stays open
        #[arg(long, default_value = "20")]
        duration: u64,
    },

    /// Encrypt, prove and submit a ballot as `--sender`
    Vote {
        #[arg(long)]
        proposal_id: ProposalId,

        /// abstain, nay or yay
        #[arg(long)]
        choice: VoteChoice,
    },

    /// Show a proposal's weight used and tally state
    Status {
        #[arg(long)]
        proposal_id: ProposalId,
    },

    /// Print the vote totals, waiting for the tally if asked
    Totals {
        #[arg(long)]
        proposal_id: ProposalId,

        /// Poll until the committee has tallied
        #[arg(long)]
        wait: bool,

        /// Maximum seconds to wait
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },

    /// Mine empty blocks (for testing)
    AdvanceBlocks {
        #[arg(long, default_value = "1")]
        n: u64,
    },
}

fn address_arg(value: &str) -> Result<Address> {
    parse_address(value).ok_or_else(|| anyhow!("invalid address: {}", value))
}

async fn check_descriptor(ledger: &RpcLedger, path: &PathBuf) -> Result<()> {
    let expected = descriptor::load_voting(path)
        .with_context(|| format!("loading voting descriptor {}", path.display()))?;
    let deployment = ledger.deployment().await.context("reading deployment")?;
    if deployment.voting != expected {
        bail!(
            "voting contract at endpoint ({}) does not match descriptor ({})",
            deployment.voting.address,
            expected.address
        );
    }
    Ok(())
}

async fn register_cmd(ledger: &RpcLedger, voter: &str, weight: u64) -> Result<()> {
    let voter = address_arg(voter)?;
    RetryPolicy::default()
        .execute("add_voter", || ledger.add_voter(voter, weight))
        .await
        .context("registering voter")?;
    println!("Registered {} with weight {}", format_address(&voter), weight);
    Ok(())
}

async fn setup_vote_cmd(ledger: &RpcLedger, proposal_id: ProposalId, duration: u64) -> Result<()> {
    let head = ledger.block_number().await.context("reading block number")?;
    let end_block = head + duration;
    RetryPolicy::default()
        .execute("setup_vote", || ledger.setup_vote(proposal_id, end_block))
        .await
        .context("setting up vote")?;
    println!("Proposal {} open until block {}", proposal_id, end_block);
    Ok(())
}

async fn vote_cmd(ledger: &RpcLedger, proposal_id: ProposalId, choice: VoteChoice) -> Result<()> {
    let prover = SigmaProver::new();
    cast_vote(
        ledger,
        &prover,
        proposal_id,
        choice,
        &RetryPolicy::default(),
        &mut OsRng,
    )
    .await
    .context("casting vote")?;
    info!(proposal_id, %choice, "vote cast");
    println!("Vote submitted for proposal {}", proposal_id);
    Ok(())
}

async fn totals_cmd(
    ledger: &RpcLedger,
    proposal_id: ProposalId,
    wait: bool,
    timeout_secs: u64,
) -> Result<()> {
    let totals = if wait {
        let poll = PollPolicy::events();
        let max_polls = (Duration::from_secs(timeout_secs).as_millis()
            / poll.interval.as_millis().max(1)) as u32;
        wait_for_tally(ledger, proposal_id, &poll.with_max_polls(max_polls.max(1)))
            .await
            .context("waiting for tally")?
    } else {
        let status = proposal_status(ledger, proposal_id)
            .await
            .context("reading proposal")?;
        if !status.tally_complete {
            println!("Proposal {} has not been tallied yet", proposal_id);
            return Ok(());
        }
        status.totals
    };
    println!("Totals for proposal {}:", proposal_id);
    println!("{}", TotalsDisplay(&totals));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voter=info".parse().unwrap())
                .add_directive("jsonrpsee=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let sender = address_arg(&cli.sender)?;
    let ledger = RpcLedger::connect(&cli.rpc, sender).context("connecting to ledger")?;
    if let Some(path) = &cli.voting_descriptor {
        check_descriptor(&ledger, path).await?;
    }

    match cli.command {
        Commands::Register { voter, weight } => register_cmd(&ledger, &voter, weight).await?,

        Commands::SetupVote {
            proposal_id,
            duration,
        } => setup_vote_cmd(&ledger, proposal_id, duration).await?,

        Commands::Vote {
            proposal_id,
            choice,
        } => vote_cmd(&ledger, proposal_id, choice).await?,

        Commands::Status { proposal_id } => {
            let status = proposal_status(&ledger, proposal_id)
                .await
                .context("reading proposal")?;
            println!("{}", status);
        }

        Commands::Totals {
            proposal_id,
            wait,
            timeout_secs,
        } => totals_cmd(&ledger, proposal_id, wait, timeout_secs).await?,

        Commands::AdvanceBlocks { n } => {
            let head = ledger.advance_blocks(n).await.context("advancing blocks")?;
            println!("Block number: {}", head);
        }
    }

    Ok(())
}
