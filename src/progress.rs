//! Durable record of already-settled recipients.
//!
//! The snapshot on disk is a JSON array of lowercase addresses. Writes are
//! buffered in memory and flushed as an atomic replace (write a temp file,
//! then rename), so a crash can cost at most one buffer of progress and can
//! never corrupt the previous snapshot.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ethers::types::Address;

/// Canonical on-disk spelling of a recipient address.
pub fn canonical(addr: &Address) -> String {
    format!("{addr:#x}")
}

pub struct ProgressStore {
    path: PathBuf,
    saved: BTreeSet<String>,
    pending: Vec<String>,
    flush_threshold: usize,
}

impl ProgressStore {
    /// Loads the snapshot; a missing file means no progress yet. A file that
    /// exists but cannot be parsed is an error: silently starting fresh over
    /// a damaged snapshot would pay every recipient in it a second time.
    pub fn load(path: impl Into<PathBuf>, flush_threshold: usize) -> Result<Self> {
        let path = path.into();
        let saved = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read progress file {}", path.display()))?;
            let entries: Vec<String> = serde_json::from_str(&raw).with_context(|| {
                format!(
                    "progress file {} is not a JSON address array; refusing to start fresh",
                    path.display()
                )
            })?;
            entries.into_iter().map(|a| a.to_lowercase()).collect()
        } else {
            BTreeSet::new()
        };
        Ok(Self {
            path,
            saved,
            pending: Vec::new(),
            flush_threshold: flush_threshold.max(1),
        })
    }

    pub fn contains(&self, addr: &Address) -> bool {
        let key = canonical(addr);
        self.saved.contains(&key) || self.pending.contains(&key)
    }

    /// Recipients in the durable snapshot.
    pub fn done_count(&self) -> usize {
        self.saved.len()
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Buffers a confirmed batch; nothing touches disk until `flush`.
    pub fn record(&mut self, batch: &[Address]) {
        self.pending.extend(batch.iter().map(canonical));
    }

    /// Merges the buffer into the snapshot and replaces it atomically, but
    /// only once the buffer reaches the threshold or `force` is set. On a
    /// write failure the buffer is kept for the next attempt.
    pub fn flush(&mut self, force: bool) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if !force && self.pending.len() < self.flush_threshold {
            return Ok(());
        }

        let mut merged = self.saved.clone();
        merged.extend(self.pending.iter().cloned());
        let body = serde_json::to_string_pretty(&merged.iter().collect::<Vec<_>>())?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }
        // Same directory as the snapshot, so the rename stays on one filesystem.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to move {} into place", tmp.display())
        })?;

        self.saved = merged;
        self.pending.clear();
        Ok(())
    }
}
