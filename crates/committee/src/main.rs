//! `committee`: committee member node.
//!
//! Runs the DKG, persists the member's share and watches the ledger for
//! proposals to tally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{info, warn};

use zkvote_committee::{
    generate_key_file, load_signing_key, member_address, MemberState, Orchestrator,
    OrchestratorConfig, TallyEngine,
};
use zkvote_dkg::{CommitteeMember, DkgConfig, DkgParticipant};
use zkvote_ledger::{descriptor, Ledger, RpcLedger};
use zkvote_prover::{Prover, SigmaProver};
use zkvote_types::{format_address, ProposalId};

#[derive(Parser)]
#[command(name = "committee")]
#[command(about = "Threshold voting committee member")]
struct Cli {
    /// Mock chain RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:9944")]
    rpc: String,

    /// Directory for the member's state file
    #[arg(long, default_value = "./committee-data")]
    data_dir: PathBuf,

    /// Member signing key (hex-encoded Ed25519 seed)
    #[arg(long, default_value = "./committee-data/member.key")]
    key_file: PathBuf,

    /// DKG contract descriptor to check the endpoint against
    #[arg(long)]
    dkg_descriptor: Option<PathBuf>,

    /// Voting contract descriptor to check the endpoint against
    #[arg(long)]
    voting_descriptor: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a member key and print its address
    Keygen,

    /// Run the DKG and store the resulting share
    Dkg,

    /// Rebuild the share from the ledger after losing local state
    Recover,

    /// Submit this member's partial decryption for one proposal
    Tally {
        #[arg(long)]
        proposal_id: ProposalId,
    },

    /// Watch for proposals and tally them when due
    Watch {
        /// Tally early once this much voting weight is used
        #[arg(long)]
        vote_weight_threshold: Option<u64>,

        /// First block to scan (defaults to the voting contract's deploy block)
        #[arg(long)]
        start_block: Option<u64>,
    },
}

async fn check_descriptors(ledger: &RpcLedger, cli: &Cli) -> Result<()> {
    if cli.dkg_descriptor.is_none() && cli.voting_descriptor.is_none() {
        return Ok(());
    }
    let deployment = ledger.deployment().await.context("reading deployment")?;
    if let Some(path) = &cli.dkg_descriptor {
        let expected = descriptor::load_dkg(path)
            .with_context(|| format!("loading DKG descriptor {}", path.display()))?;
        if deployment.dkg != expected {
            bail!(
                "DKG contract at endpoint ({}) does not match descriptor ({})",
                deployment.dkg.address,
                expected.address
            );
        }
    }
    if let Some(path) = &cli.voting_descriptor {
        let expected = descriptor::load_voting(path)
            .with_context(|| format!("loading voting descriptor {}", path.display()))?;
        if deployment.voting != expected {
            bail!(
                "voting contract at endpoint ({}) does not match descriptor ({})",
                deployment.voting.address,
                expected.address
            );
        }
    }
    Ok(())
}

async fn participant(
    ledger: &RpcLedger,
    prover: Arc<dyn Prover>,
    key: &SigningKey,
) -> Result<DkgParticipant<RpcLedger>> {
    let config = DkgConfig::from_ledger(ledger)
        .await
        .context("reading DKG configuration")?;
    info!(
        member_id = config.member_id,
        n = config.n,
        threshold = config.threshold,
        "joining committee"
    );
    Ok(DkgParticipant::from_signer(config, ledger.clone(), prover, key)?)
}

fn save_member(data_dir: &Path, member: &CommitteeMember) -> Result<()> {
    let path = MemberState::state_file(data_dir);
    MemberState::from_member(member)
        .save(&path)
        .context("saving member state")?;
    info!(path = %path.display(), "member state saved");
    Ok(())
}

async fn dkg_cmd(
    ledger: &RpcLedger,
    prover: Arc<dyn Prover>,
    key: &SigningKey,
    data_dir: &Path,
) -> Result<()> {
    let member = participant(ledger, prover, key)
        .await?
        .run()
        .await
        .context("DKG failed")?;
    save_member(data_dir, &member)?;
    println!("Member {} joined the committee", member.member_id);
    println!("Committee public key: {:?}", member.public_key.encode());
    Ok(())
}

async fn recover_member(
    ledger: &RpcLedger,
    prover: Arc<dyn Prover>,
    key: &SigningKey,
    data_dir: &Path,
) -> Result<CommitteeMember> {
    let member = participant(ledger, prover, key)
        .await?
        .recover()
        .await
        .context("recovering share from ledger")?;
    save_member(data_dir, &member)?;
    Ok(member)
}

/// The stored member, or one recovered from the ledger if nothing is stored.
async fn load_member(
    ledger: &RpcLedger,
    prover: Arc<dyn Prover>,
    key: &SigningKey,
    data_dir: &Path,
) -> Result<CommitteeMember> {
    let path = MemberState::state_file(data_dir);
    if !path.exists() {
        warn!(path = %path.display(), "no member state, recovering from ledger");
        return recover_member(ledger, prover, key, data_dir).await;
    }
    let member = MemberState::load(&path)
        .and_then(|state| state.to_member())
        .context("loading member state")?;
    Ok(member)
}

async fn watch_cmd(
    engine: TallyEngine<RpcLedger>,
    vote_weight_threshold: Option<u64>,
    start_block: Option<u64>,
) -> Result<()> {
    let start_block = match start_block {
        Some(block) => block,
        None => {
            engine
                .ledger()
                .deployment()
                .await
                .context("reading deployment")?
                .voting
                .block_number_before_deploy
        }
    };
    info!(
        member_id = engine.member().member_id,
        start_block,
        ?vote_weight_threshold,
        "watching for proposals"
    );
    let config = OrchestratorConfig {
        start_block,
        vote_weight_threshold,
        ..OrchestratorConfig::default()
    };
    Orchestrator::new(engine, config)
        .run()
        .await
        .context("watching proposals")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("committee=info".parse().unwrap())
                .add_directive("jsonrpsee=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Keygen = cli.command {
        let key = generate_key_file(&cli.key_file, &mut OsRng).context("generating key")?;
        println!("Key written to {}", cli.key_file.display());
        println!("Member address: {}", format_address(&member_address(&key)));
        return Ok(());
    }

    let key = load_signing_key(&cli.key_file).context("loading member key")?;
    let address = member_address(&key);
    let ledger = RpcLedger::connect(&cli.rpc, address).context("connecting to ledger")?;
    check_descriptors(&ledger, &cli).await?;
    let prover: Arc<dyn Prover> = Arc::new(SigmaProver::new());
    info!(address = %format_address(&address), "member key loaded");

    match cli.command {
        Commands::Keygen => {}

        Commands::Dkg => dkg_cmd(&ledger, prover, &key, &cli.data_dir).await?,

        Commands::Recover => {
            let member = recover_member(&ledger, prover, &key, &cli.data_dir).await?;
            println!("Recovered share for member {}", member.member_id);
        }

        Commands::Tally { proposal_id } => {
            let member = load_member(&ledger, prover.clone(), &key, &cli.data_dir).await?;
            let outcome = TallyEngine::new(ledger, prover, member)
                .tally(proposal_id)
                .await
                .with_context(|| format!("tallying proposal {}", proposal_id))?;
            println!("Proposal {}: {:?}", proposal_id, outcome);
        }

        Commands::Watch {
            vote_weight_threshold,
            start_block,
        } => {
            let member = load_member(&ledger, prover.clone(), &key, &cli.data_dir).await?;
            let engine = TallyEngine::new(ledger, prover, member);
            watch_cmd(engine, vote_weight_threshold, start_block).await?;
        }
    }

    Ok(())
}
