//! Contract descriptor files.
//!
//! The mock chain writes one JSON file per contract after deployment;
//! clients and committee members read them once at start-up.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use zkvote_types::{parse_address, Deployment, DkgDescriptor, VotingDescriptor};

use crate::error::{LedgerError, LedgerResult};

pub const DKG_DESCRIPTOR_FILE: &str = "dkg.json";
pub const VOTING_DESCRIPTOR_FILE: &str = "voting.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> LedgerResult<T> {
    let data = fs::read_to_string(path)
        .map_err(|e| LedgerError::Descriptor(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&data)
        .map_err(|e| LedgerError::Descriptor(format!("{}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> LedgerResult<()> {
    let data = serde_json::to_string_pretty(value)
        .map_err(|e| LedgerError::Descriptor(e.to_string()))?;
    fs::write(path, data)
        .map_err(|e| LedgerError::Descriptor(format!("{}: {}", path.display(), e)))
}

fn check_address(address: &str) -> LedgerResult<()> {
    parse_address(address)
        .map(|_| ())
        .ok_or_else(|| LedgerError::Descriptor(format!("invalid contract address {:?}", address)))
}

pub fn validate_dkg(descriptor: &DkgDescriptor) -> LedgerResult<()> {
    check_address(&descriptor.address)?;
    if descriptor.threshold == 0 || descriptor.threshold > descriptor.n_comm {
        return Err(LedgerError::Descriptor(format!(
            "threshold {} outside 1..={}",
            descriptor.threshold, descriptor.n_comm
        )));
    }
    Ok(())
}

pub fn load_dkg(path: &Path) -> LedgerResult<DkgDescriptor> {
    let descriptor: DkgDescriptor = read_json(path)?;
    validate_dkg(&descriptor)?;
    Ok(descriptor)
}

pub fn load_voting(path: &Path) -> LedgerResult<VotingDescriptor> {
    let descriptor: VotingDescriptor = read_json(path)?;
    check_address(&descriptor.address)?;
    Ok(descriptor)
}

/// Write both descriptors into `dir`, returning their paths.
pub fn write_deployment(dir: &Path, deployment: &Deployment) -> LedgerResult<(PathBuf, PathBuf)> {
    validate_dkg(&deployment.dkg)?;
    fs::create_dir_all(dir)
        .map_err(|e| LedgerError::Descriptor(format!("{}: {}", dir.display(), e)))?;
    let dkg_path = dir.join(DKG_DESCRIPTOR_FILE);
    let voting_path = dir.join(VOTING_DESCRIPTOR_FILE);
    write_json(&dkg_path, &deployment.dkg)?;
    write_json(&voting_path, &deployment.voting)?;
    info!(
        dkg = %dkg_path.display(),
        voting = %voting_path.display(),
        "descriptors written"
    );
    Ok((dkg_path, voting_path))
}
