//! Atomic publishing of snapshots to the shared state file
//!
//! Readers of the target path must never see a partial record. Every write goes to a staging
//! file next to the target, is flushed to disk and then renamed over the target in one step, so a
//! reader opens either the previous record or the new one. The directory is synced after the
//! rename so the new entry itself survives a power cut.
//!
//! Identical consecutive records are not rewritten. Consumers still have to cope with re-reading
//! an unchanged file.

use crate::config::OutputConfig;
use crate::snapshot::Snapshot;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to write temporary file {}: {source}", .path.display())]
    TempWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to flush temporary file {}: {source}", .path.display())]
    Sync {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to rename {} onto {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Result of a successful [`Publisher::publish`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    /// Same record as the last successful write, nothing touched
    Unchanged,
}

#[derive(Debug)]
pub struct Publisher {
    target: PathBuf,
    temp: PathBuf,
    last_published: Option<String>,
    writes: u64,
    skipped: u64,
    dir_syncs: u64,
}

impl Publisher {
    pub fn new(output: &OutputConfig) -> Self {
        Self::with_paths(output.path.clone(), output.temp_path())
    }

    /// `temp` must live on the same filesystem as `target` for the rename to be atomic
    pub fn with_paths(target: PathBuf, temp: PathBuf) -> Self {
        debug!(
            "Publisher writing to {} via {}",
            target.display(),
            temp.display()
        );
        Self {
            target,
            temp,
            last_published: None,
            writes: 0,
            skipped: 0,
            dir_syncs: 0,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn last_published(&self) -> Option<&str> {
        self.last_published.as_deref()
    }

    /// Number of records actually written
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Number of publish calls skipped because the record was unchanged
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Number of renames whose directory entry was flushed to disk
    pub fn dir_syncs(&self) -> u64 {
        self.dir_syncs
    }

    pub async fn publish(&mut self, snapshot: &Snapshot) -> Result<PublishOutcome, PublishError> {
        let record = snapshot.to_record();
        if self.last_published.as_deref() == Some(record.as_str()) {
            self.skipped += 1;
            return Ok(PublishOutcome::Unchanged);
        }

        self.write_staged(&record).await?;
        tokio::fs::rename(&self.temp, &self.target)
            .await
            .map_err(|source| PublishError::Rename {
                from: self.temp.clone(),
                to: self.target.clone(),
                source,
            })?;

        // The record is already visible, a failed directory sync only weakens durability
        match sync_dir(parent_dir(&self.target)).await {
            Ok(()) => self.dir_syncs += 1,
            Err(e) => warn!(
                "Failed to sync directory of {}: {}",
                self.target.display(),
                e
            ),
        }

        debug!("Published {}", record.trim_end());
        self.last_published = Some(record);
        self.writes += 1;
        Ok(PublishOutcome::Written)
    }

    // Writes the full record to the staging path and flushes it to disk
    async fn write_staged(&self, record: &str) -> Result<(), PublishError> {
        let temp_err = |source| PublishError::TempWrite {
            path: self.temp.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&self.temp).await.map_err(temp_err)?;
        file.write_all(record.as_bytes()).await.map_err(temp_err)?;
        file.sync_all().await.map_err(|source| PublishError::Sync {
            path: self.temp.clone(),
            source,
        })?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

// Flushes the directory entry so a completed rename is durable
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}
