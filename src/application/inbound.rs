//! The download half of a scheduling cycle: pull inbound (correction) and
//! return files from each configured institution over a short-lived Agent
//! session, mirror them into a scratch directory, and dispatch them to the
//! correction and return processors.

use crate::application::Environment;
use crate::application::correction::CorrectionProcessor;
use crate::application::metrics::Counter;
use crate::application::returns::ReturnProcessor;
use crate::domain::ach::AchFile;
use crate::domain::ports::Agent;
use crate::domain::records::{TransferConfig, Transport};
use crate::error::{Result, TransferError};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{error, info, warn};

pub async fn download_and_process(env: Arc<Environment>, update_policy: bool) -> Result<()> {
    let cutoffs = env.config.get_cutoff_times().await?;
    let configs = env.config.get_configs().await?;
    let ftp = env.config.get_ftp_configs().await?;
    let sftp = env.config.get_sftp_configs().await?;
    let correction = CorrectionProcessor::new(env.clone(), update_policy);
    let returns = ReturnProcessor::new(env.clone());

    let mut first_err = None;
    for cutoff in &cutoffs {
        let routing = &cutoff.routing_number;
        let Some(config) = configs.iter().find(|c| &c.routing_number == routing) else {
            env.metrics.record(Counter::MissingConfigs, routing);
            warn!(routing, "no transfer config for cutoff, skipping");
            continue;
        };
        let Some(transport) = Transport::resolve(routing, &ftp, &sftp) else {
            warn!(routing, "unknown transport for destination, skipping");
            continue;
        };
        if let Err(err) =
            process_destination(&env, &correction, &returns, &transport, config).await
        {
            error!(routing, "inbound cycle failed: {err}");
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// One institution's download: mirror remote inbound/return trees into a
/// per-cycle scratch directory, then walk the local copies. The scratch
/// directory is discarded when this function returns.
async fn process_destination(
    env: &Environment,
    correction: &CorrectionProcessor,
    returns: &ReturnProcessor,
    transport: &Transport,
    config: &TransferConfig,
) -> Result<()> {
    let routing = &config.routing_number;
    let scratch = TempDir::new()?;
    let inbound_dir = scratch.path().join("inbound");
    let return_dir = scratch.path().join("returned");
    fs::create_dir_all(&inbound_dir)?;
    fs::create_dir_all(&return_dir)?;

    let mut agent = env.agents.connect(transport, config).await?;
    let download = async {
        let remote_inbound = agent.inbound_path().to_string();
        for file in agent.get_inbound_files().await? {
            save_then_delete_remote(&mut *agent, &remote_inbound, &file.filename, &file.contents, &inbound_dir)
                .await?;
        }
        let remote_returns = agent.return_path().to_string();
        for file in agent.get_return_files().await? {
            save_then_delete_remote(&mut *agent, &remote_returns, &file.filename, &file.contents, &return_dir)
                .await?;
        }
        Ok::<(), TransferError>(())
    }
    .await;
    // A close failure must not replace the download outcome.
    if let Err(err) = agent.close().await {
        warn!(routing, "agent close failed: {err}");
    }
    download?;

    let mut first_err = None;

    for path in sorted_files(&inbound_dir)? {
        let label = path.display().to_string();
        let file = match fs::read_to_string(&path).map_err(TransferError::from).and_then(|c| AchFile::parse(&c)) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %label, "failed to parse inbound file: {err}");
                continue;
            }
        };
        env.metrics.record(Counter::InboundFilesProcessed, routing);
        if file.corrections().next().is_none() {
            info!(path = %label, "inbound file has no correction entries, skipping");
            continue;
        }
        if let Err(err) = correction.process_file(&label, &file).await {
            first_err.get_or_insert(err);
        }
    }

    for path in sorted_files(&return_dir)? {
        let label = path.display().to_string();
        let file = match fs::read_to_string(&path).map_err(TransferError::from).and_then(|c| AchFile::parse(&c)) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %label, "failed to parse return file: {err}");
                continue;
            }
        };
        env.metrics.record(Counter::ReturnFilesProcessed, routing);
        if let Err(err) = returns.process_file(&label, &file).await {
            first_err.get_or_insert(err);
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Write the local copy durably, then delete the remote original. A crash
/// between the two leaves the remote file in place for the next cycle.
async fn save_then_delete_remote(
    agent: &mut dyn Agent,
    remote_dir: &str,
    filename: &str,
    contents: &[u8],
    local_dir: &Path,
) -> Result<()> {
    let local = local_dir.join(filename);
    let mut out = fs::File::create(&local)?;
    out.write_all(contents)?;
    out.sync_all()?;
    agent.delete(&format!("{remote_dir}/{filename}")).await
}

fn sorted_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}
