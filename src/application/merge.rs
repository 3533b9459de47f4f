//! Consolidates single-payment files into capped-size batch files, one
//! lineage of sequence-numbered files per destination routing number.
//!
//! Pricing and network rules favor few large files, so batches are folded
//! into the newest on-disk file for their destination until the hard
//! per-file line ceiling would be crossed; the full file is then frozen for
//! upload and a new sequence member takes over.

use crate::domain::ach::{AchFile, FileHeader};
use crate::domain::filename::{self, DEFAULT_TEMPLATE, UPLOADED_SUFFIX, FilenameParts};
use crate::error::{Result, TransferError};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Hard ceiling on encoded lines per merged file.
pub const DEFAULT_LINE_LIMIT: usize = 10_000;

/// Per-destination async locks guarding MergableFile read-modify-write.
/// Merge and removal paths may run concurrently, so every mutation of a
/// destination's on-disk lineage happens under its lock.
#[derive(Clone, Default)]
pub struct DirLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_destination(&self, routing_number: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("dir lock map poisoned");
        map.entry(routing_number.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// An in-progress batch file on disk, identified by (destination, sequence).
#[derive(Debug, Clone, PartialEq)]
pub struct MergableFile {
    pub path: PathBuf,
    pub sequence: u8,
    pub file: AchFile,
}

impl MergableFile {
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// What one merge call produced: the file the batches landed in, plus any
/// file frozen at the ceiling and now ready for upload.
#[derive(Debug)]
pub struct MergeOutcome {
    pub merged_into: String,
    pub frozen: Vec<MergableFile>,
}

pub struct MergeEngine {
    dir: PathBuf,
    line_limit: usize,
    locks: DirLocks,
}

impl MergeEngine {
    pub fn new(root: &Path, line_limit: usize, locks: DirLocks) -> Result<Self> {
        let dir = root.join("merged");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            line_limit,
            locks,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn locks(&self) -> &DirLocks {
        &self.locks
    }

    /// Highest-sequence on-disk file whose header destination equals
    /// `destination`. Lexical filename order encodes sequence order, so the
    /// scan keeps the largest parsed sequence.
    pub fn latest(&self, destination: &str) -> Result<Option<MergableFile>> {
        let mut newest: Option<MergableFile> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".ach") {
                continue;
            }
            let Ok(parts) = filename::parse(name) else {
                continue;
            };
            if parts.routing_number != destination {
                continue;
            }
            let file = AchFile::parse(&fs::read_to_string(&path)?)?;
            if file.header.destination != destination {
                continue;
            }
            if newest
                .as_ref()
                .map(|m| parts.sequence > m.sequence)
                .unwrap_or(true)
            {
                newest = Some(MergableFile {
                    path,
                    sequence: parts.sequence,
                    file,
                });
            }
        }
        Ok(newest)
    }

    /// Every not-yet-uploaded merged file, optionally limited to one
    /// destination. The `.uploaded` rename keeps finished files out of this
    /// glob.
    pub fn ready_files(&self, destination: Option<&str>) -> Result<Vec<MergableFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".ach") {
                continue;
            }
            let Ok(parts) = filename::parse(name) else {
                continue;
            };
            if let Some(dest) = destination
                && parts.routing_number != dest
            {
                continue;
            }
            files.push(MergableFile {
                file: AchFile::parse(&fs::read_to_string(&path)?)?,
                sequence: parts.sequence,
                path,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Folds `incoming`'s batches into the destination's current mergable
    /// file, splitting at the line ceiling. Holds the destination lock for
    /// the whole read-modify-write.
    pub async fn merge(&self, incoming: &AchFile) -> Result<MergeOutcome> {
        if incoming.batches.is_empty() {
            return Err(TransferError::EmptyFile(format!(
                "incoming file for {}",
                incoming.header.destination
            )));
        }
        // A batch that cannot fit even in an otherwise-empty file would roll
        // over the ceiling on every split; reject it up front.
        for batch in &incoming.batches {
            if batch.line_count() + 2 > self.line_limit {
                return Err(TransferError::Validation(format!(
                    "batch of {} lines cannot fit under the {}-line ceiling",
                    batch.line_count(),
                    self.line_limit
                )));
            }
        }
        let destination = incoming.header.destination.clone();
        let lock = self.locks.for_destination(&destination);
        let _guard = lock.lock().await;

        let mut current = match self.latest(&destination)? {
            Some(file) => file,
            None => self.create(&incoming.header, self.next_sequence(&destination)?)?,
        };
        let mut frozen = Vec::new();

        for batch in &incoming.batches {
            // Idempotence: reprocessing a source file must not duplicate its
            // batches.
            if current.file.batches.contains(batch) {
                continue;
            }
            current.file.batches.push(batch.clone());
            self.persist(&current)?;
            if current.file.line_count() > self.line_limit {
                let overflow = current
                    .file
                    .batches
                    .pop()
                    .expect("batch was just appended");
                self.persist(&current)?;
                debug!(
                    destination = %destination,
                    filename = %current.filename(),
                    "merged file reached line ceiling, freezing"
                );
                let next_seq = current.sequence + 1;
                frozen.push(current);
                current = self.create(&incoming.header, next_seq)?;
                current.file.batches.push(overflow);
                self.persist(&current)?;
            }
        }

        Ok(MergeOutcome {
            merged_into: current.filename(),
            frozen,
        })
    }

    /// First unused sequence for a destination. Uploaded siblings still
    /// count, so a lineage never reuses a name already pushed remotely.
    fn next_sequence(&self, destination: &str) -> Result<u8> {
        let mut highest = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = name.strip_suffix(UPLOADED_SUFFIX).unwrap_or(name);
            if !name.ends_with(".ach") {
                continue;
            }
            let Ok(parts) = filename::parse(name) else {
                continue;
            };
            if parts.routing_number == destination && parts.sequence > highest {
                highest = parts.sequence;
            }
        }
        Ok(highest + 1)
    }

    /// Seeds a new lineage member from an incoming header: creation
    /// date/time reset to now, id modifier derived from the sequence token.
    fn create(&self, seed: &FileHeader, sequence: u8) -> Result<MergableFile> {
        let now = Utc::now();
        let token = filename::render_sequence(sequence)?;
        let name = filename::render(
            DEFAULT_TEMPLATE,
            &FilenameParts {
                date: now.date_naive(),
                routing_number: seed.destination.clone(),
                sequence,
            },
        )?;
        let header = FileHeader {
            destination: seed.destination.clone(),
            origin: seed.origin.clone(),
            creation_date: now.format("%y%m%d").to_string(),
            creation_time: now.format("%H%M").to_string(),
            id_modifier: token.chars().next().expect("token is one char"),
        };
        let file = MergableFile {
            path: self.dir.join(name),
            sequence,
            file: AchFile::new(header),
        };
        self.persist(&file)?;
        Ok(file)
    }

    /// Write-through persistence: every append lands on disk before the next
    /// batch is considered.
    pub fn persist(&self, file: &MergableFile) -> Result<()> {
        fs::write(&file.path, file.file.encode())?;
        Ok(())
    }

    pub fn delete(&self, file: &MergableFile) -> Result<()> {
        fs::remove_file(&file.path)?;
        Ok(())
    }

    /// Freeze an uploaded file under the `.uploaded` suffix so future scans
    /// ignore it. Not atomic with the upload itself; a crash between the two
    /// can re-upload at the next tick.
    pub fn mark_uploaded(&self, file: &MergableFile) -> Result<()> {
        let mut renamed = file.path.clone().into_os_string();
        renamed.push(UPLOADED_SUFFIX);
        fs::rename(&file.path, &renamed)?;
        Ok(())
    }
}
