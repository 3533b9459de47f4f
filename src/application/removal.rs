//! Removal of a not-yet-uploaded entry from its merged file, used when a
//! transfer or micro-deposit is cancelled after merging.

use crate::application::merge::MergeEngine;
use crate::domain::ach::TraceNumber;
use crate::error::Result;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The target was the file's sole batch; the file itself was deleted.
    FileDeleted,
    /// The matching batch was excised and the file rewritten.
    BatchExcised,
    /// Nothing in the destination's current file matches the trace number.
    NotFound,
}

/// Excise the batch holding `trace` from the destination's current mergable
/// file. Runs under the destination lock because an outbound merge may be
/// in flight. No match is a no-op, not an error.
pub async fn remove_entry(
    engine: &MergeEngine,
    destination: &str,
    trace: &TraceNumber,
) -> Result<RemovalOutcome> {
    let lock = engine.locks().for_destination(destination);
    let _guard = lock.lock().await;

    let Some(mut current) = engine.latest(destination)? else {
        return Ok(RemovalOutcome::NotFound);
    };
    let Some(index) = current
        .file
        .batches
        .iter()
        .position(|b| b.entries.iter().any(|e| e.trace_number == *trace))
    else {
        return Ok(RemovalOutcome::NotFound);
    };

    if current.file.batches.len() == 1 {
        engine.delete(&current)?;
        info!(destination, %trace, filename = %current.filename(), "deleted merged file");
        return Ok(RemovalOutcome::FileDeleted);
    }

    current.file.batches.remove(index);
    engine.persist(&current)?;
    info!(destination, %trace, filename = %current.filename(), "excised batch from merged file");
    Ok(RemovalOutcome::BatchExcised)
}
