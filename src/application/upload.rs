//! The merge-and-upload half of a scheduling cycle: fold pending payment
//! records into merged files, then push files nearing their cutoff (or all
//! of them, when forced) to their destination institutions.

use crate::application::Environment;
use crate::application::merge::{MergableFile, MergeEngine};
use crate::application::metrics::Counter;
use crate::domain::ach::{AchFile, TraceNumber};
use crate::domain::filename::{self, FilenameParts};
use crate::domain::records::{TransferStatus, Transport};
use crate::error::{Result, TransferError};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Default window before a cutoff during which its destination's merged
/// files become upload candidates.
pub const DEFAULT_CUTOFF_DELTA_MINUTES: i64 = 5;

/// How an outbound cycle decides what to upload after merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Merge only; used by ops tooling and tests.
    Skip,
    /// Upload destinations whose cutoff is within the delta.
    CutoffDriven,
    /// Upload every file currently in the merge directory.
    Forced,
}

pub async fn merge_and_upload(
    env: Arc<Environment>,
    engine: Arc<MergeEngine>,
    delta: Duration,
    mode: UploadMode,
) -> Result<()> {
    merge_pending(&env, &engine).await?;
    match mode {
        UploadMode::Skip => Ok(()),
        UploadMode::CutoffDriven => upload_near_cutoff(&env, &engine, delta, Utc::now()).await,
        UploadMode::Forced => upload_all(&env, &engine).await,
    }
}

/// Folds every pending transfer and micro-deposit into its destination's
/// merged file. A merge failure poisons its destination for the rest of the
/// cycle but leaves other destinations running; the records stay pending and
/// the next tick retries.
pub async fn merge_pending(env: &Environment, engine: &MergeEngine) -> Result<()> {
    let mut failed_destinations: HashSet<String> = HashSet::new();

    for pending in env.transfers.pending().await? {
        if failed_destinations.contains(&pending.destination) {
            continue;
        }
        match merge_source_file(engine, &pending.source_path).await {
            Ok((merged_into, trace)) => {
                env.transfers
                    .mark_merged(&pending.transfer_id, &merged_into, &trace)
                    .await?;
                env.metrics
                    .record(Counter::TransfersMerged, &pending.destination);
            }
            // Invalid source files never become mergeable; reject the record
            // instead of retrying it every tick.
            Err(
                err @ (TransferError::Validation(_)
                | TransferError::Parse(_)
                | TransferError::EmptyFile(_)),
            ) => {
                warn!(
                    transfer_id = %pending.transfer_id,
                    destination = %pending.destination,
                    "source file invalid, rejecting: {err}"
                );
                if let Some(mut transfer) = env.transfers.get(&pending.transfer_id).await? {
                    transfer.status = TransferStatus::Rejected;
                    env.transfers.update(transfer).await?;
                }
            }
            Err(err) => {
                warn!(
                    transfer_id = %pending.transfer_id,
                    destination = %pending.destination,
                    "merge failed: {err}"
                );
                failed_destinations.insert(pending.destination.clone());
            }
        }
    }

    for pending in env.micro_deposits.pending().await? {
        if failed_destinations.contains(&pending.destination) {
            continue;
        }
        match merge_source_file(engine, &pending.source_path).await {
            Ok((merged_into, trace)) => {
                env.micro_deposits
                    .mark_merged(&pending.depository_id, &merged_into, &trace)
                    .await?;
                env.metrics
                    .record(Counter::TransfersMerged, &pending.destination);
            }
            Err(
                err @ (TransferError::Validation(_)
                | TransferError::Parse(_)
                | TransferError::EmptyFile(_)),
            ) => {
                warn!(
                    depository_id = %pending.depository_id,
                    destination = %pending.destination,
                    "micro-deposit source file invalid, rejecting: {err}"
                );
                env.micro_deposits
                    .mark_rejected(&pending.depository_id)
                    .await?;
            }
            Err(err) => {
                warn!(
                    depository_id = %pending.depository_id,
                    destination = %pending.destination,
                    "micro-deposit merge failed: {err}"
                );
                failed_destinations.insert(pending.destination.clone());
            }
        }
    }

    Ok(())
}

/// Reads, validates, and merges one single-payment source file. Returns the
/// merged filename and the record's trace number for the idempotent
/// "merged" marker.
async fn merge_source_file(
    engine: &MergeEngine,
    source: &Path,
) -> Result<(String, TraceNumber)> {
    let incoming = AchFile::parse(&fs::read_to_string(source)?)?;
    validate_prenotes(&incoming)?;
    let trace = incoming
        .batches
        .first()
        .and_then(|b| b.entries.first())
        .map(|e| e.trace_number.clone())
        .ok_or_else(|| TransferError::EmptyFile(source.display().to_string()))?;
    let outcome = engine.merge(&incoming).await?;
    Ok((outcome.merged_into, trace))
}

/// Zero-dollar entries must carry a prenote transaction code, and prenotes
/// must carry a zero amount.
fn validate_prenotes(file: &AchFile) -> Result<()> {
    for batch in &file.batches {
        for entry in &batch.entries {
            if entry.is_prenote() && entry.amount_cents != 0 {
                return Err(TransferError::Validation(format!(
                    "prenote entry {} has non-zero amount",
                    entry.trace_number
                )));
            }
            if !entry.is_prenote() && entry.amount_cents == 0 {
                return Err(TransferError::Validation(format!(
                    "zero-dollar entry {} is not a prenote",
                    entry.trace_number
                )));
            }
        }
    }
    Ok(())
}

/// Cutoff-driven trigger: destinations whose signed cutoff diff sits in
/// `(0, delta]` have their merged files uploaded now.
pub async fn upload_near_cutoff(
    env: &Environment,
    engine: &MergeEngine,
    delta: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    for cutoff in env.config.get_cutoff_times().await? {
        let diff = cutoff.diff(now);
        if diff > Duration::zero() && diff <= delta {
            upload_destination(env, engine, &cutoff.routing_number).await?;
        }
    }
    Ok(())
}

/// Forced trigger: upload everything in the merge directory, grouped by
/// destination so each Agent session serves exactly one upload batch.
pub async fn upload_all(env: &Environment, engine: &MergeEngine) -> Result<()> {
    let destinations: HashSet<String> = engine
        .ready_files(None)?
        .into_iter()
        .map(|f| f.file.header.destination)
        .collect();
    for destination in destinations {
        upload_destination(env, engine, &destination).await?;
    }
    Ok(())
}

/// Uploads one destination's ready files over a single short-lived Agent
/// session. The first upload failure aborts the remaining batch and
/// surfaces to the caller.
async fn upload_destination(
    env: &Environment,
    engine: &MergeEngine,
    destination: &str,
) -> Result<()> {
    let lock = engine.locks().for_destination(destination);
    let _guard = lock.lock().await;

    let files = engine.ready_files(Some(destination))?;
    if files.is_empty() {
        return Ok(());
    }

    let configs = env.config.get_configs().await?;
    let Some(config) = configs.iter().find(|c| c.routing_number == destination) else {
        env.metrics.record(Counter::MissingConfigs, destination);
        warn!(destination, "no upload config for destination, skipping");
        return Ok(());
    };
    let ftp = env.config.get_ftp_configs().await?;
    let sftp = env.config.get_sftp_configs().await?;
    let Some(transport) = Transport::resolve(destination, &ftp, &sftp) else {
        warn!(destination, "unknown transport for destination, skipping");
        return Ok(());
    };

    let mut agent = env.agents.connect(&transport, config).await?;
    for file in &files {
        let remote_name = remote_filename(config.filename_template.as_deref(), file)?;
        if let Err(err) = agent
            .upload_file(&remote_name, file.file.encode().into_bytes())
            .await
        {
            env.metrics.record(Counter::UploadErrors, destination);
            // The upload failure is the root cause; a close failure on the
            // way out must not replace it.
            if let Err(close_err) = agent.close().await {
                warn!(destination, "agent close failed: {close_err}");
            }
            return Err(err);
        }
        env.metrics.record(Counter::FilesUploaded, destination);
        for trace in file.file.trace_numbers() {
            env.transfers.mark_processed(trace).await?;
            env.micro_deposits.mark_processed(trace).await?;
        }
        engine.mark_uploaded(file)?;
        info!(destination, filename = %remote_name, "uploaded merged file");
    }
    agent.close().await
}

/// Remote name for an uploaded file: the per-config template when one is
/// set, otherwise the local merged-file name.
fn remote_filename(template: Option<&str>, file: &MergableFile) -> Result<String> {
    let local = file.filename();
    match template {
        Some(template) => {
            let parts: FilenameParts = filename::parse(&local)?;
            filename::render(template, &parts)
        }
        None => Ok(local),
    }
}
