//! Durable per-channel record of settled message IDs.
//!
//! The ledger is a plain append-only log in the channel directory: one
//! decimal message ID per line. Appending never rewrites earlier entries, so
//! a crash loses at most the in-flight message's progress. IDs are loaded
//! once per run into a set; duplicate appends across runs are deduplicated
//! on load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Ledger filename inside a channel directory.
pub const LEDGER_FILE: &str = ".downloaded_ids.txt";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger at {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write ledger at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Read every settled ID previously recorded for this channel.
///
/// A missing or unreadable file yields an empty set, and malformed lines are
/// skipped; loading never fails the run.
pub async fn load(channel_dir: &Path) -> HashSet<i64> {
    let path = channel_dir.join(LEDGER_FILE);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(_) => return HashSet::new(),
    };
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match line.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::debug!(line, "skipping malformed ledger line");
                    None
                }
            }
        })
        .collect()
}

/// Append-only handle to a channel's ledger, held for the duration of a run.
///
/// Each [`record`](LedgerWriter::record) is flushed and synced before it
/// returns, so an entry is durable by the time the engine moves to the next
/// message. The file handle is released on drop on every exit path; `close`
/// exists for the normal path where sync errors should still surface.
pub struct LedgerWriter {
    file: File,
    path: PathBuf,
}

impl LedgerWriter {
    pub async fn open(channel_dir: &Path) -> Result<Self, LedgerError> {
        let path = channel_dir.join(LEDGER_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LedgerError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    /// Record one settled ID, newline-terminated. Safe to call once per
    /// settled message; appending an ID that already exists in the file is
    /// tolerated (load deduplicates).
    pub async fn record(&mut self, id: i64) -> Result<(), LedgerError> {
        let entry = format!("{}\n", id);
        self.write(entry.as_bytes()).await?;
        self.file
            .sync_data()
            .await
            .map_err(|source| LedgerError::Write {
                path: self.path.clone(),
                source,
            })
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LedgerError> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|source| LedgerError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.file
            .flush()
            .await
            .map_err(|source| LedgerError::Write {
                path: self.path.clone(),
                source,
            })
    }

    pub async fn close(mut self) -> Result<(), LedgerError> {
        self.file
            .sync_all()
            .await
            .map_err(|source| LedgerError::Write {
                path: self.path.clone(),
                source,
            })
    }
}
