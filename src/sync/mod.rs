//! The synchronization engine.
//!
//! Walks a channel's message history one message at a time, settles each
//! media-bearing message exactly once, and records progress durably as it
//! goes. Dedup consults two sources: the durable ledger and a one-time
//! directory snapshot (artifacts from ledger-less prior runs). A rate-limit
//! signal suspends the loop for the prescribed wait and retries that fetch
//! exactly once; any other failure leaves the message unsettled for a later
//! run.

pub mod error;

pub use error::SyncError;

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedError, MediaFetcher, Message, MessageSource};
use crate::ledger::{self, LedgerWriter};
use crate::probe::DirSnapshot;

/// Per-run options for a single channel sync.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Maximum number of messages to pull from the source; `None` scans the
    /// channel's entire history.
    pub limit: Option<usize>,
}

/// What one run accomplished.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Messages pulled from the source.
    pub scanned: u64,
    /// New artifacts written this run.
    pub downloaded: u64,
    /// Skips because the ledger already held the ID.
    pub skipped_recorded: u64,
    /// Settled via the filesystem probe without fetching.
    pub skipped_existing: u64,
    /// Messages left unsettled for a later run.
    pub failed: u64,
    /// True when the run was stopped by a cancellation signal.
    pub cancelled: bool,
}

/// One engine instance per channel invocation. Holds the run's mutable state
/// (ID set, snapshot) exclusively; nothing is shared process-wide.
pub struct SyncEngine<'a> {
    source: &'a dyn MessageSource,
    fetcher: &'a dyn MediaFetcher,
    cancel: CancellationToken,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn MessageSource,
        fetcher: &'a dyn MediaFetcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            fetcher,
            cancel,
        }
    }

    /// Run one synchronization pass for `channel_id` under `output_root`.
    ///
    /// Strictly sequential: one message, one decision, one durable record,
    /// then the next message. The only suspension point is the rate-limit
    /// wait inside [`fetch_with_backoff`](Self::fetch_with_backoff).
    pub async fn sync_channel(
        &self,
        channel_id: i64,
        output_root: &Path,
        options: &SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let channel_dir = output_root.join(channel_id.to_string());
        tokio::fs::create_dir_all(&channel_dir)
            .await
            .map_err(|source| SyncError::Init {
                path: channel_dir.clone(),
                source,
            })?;

        let mut settled = ledger::load(&channel_dir).await;
        let mut snapshot =
            DirSnapshot::scan(&channel_dir)
                .await
                .map_err(|source| SyncError::Snapshot {
                    path: channel_dir.clone(),
                    source,
                })?;
        let mut writer = LedgerWriter::open(&channel_dir).await?;

        tracing::info!(
            channel_id,
            dir = %channel_dir.display(),
            recorded = settled.len(),
            "starting sync"
        );

        let mut report = SyncReport::default();
        let mut stream = self.source.messages(channel_id, options.limit);

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, stopping between messages");
                report.cancelled = true;
                break;
            }
            let Some(next) = stream.next().await else {
                break;
            };
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    // A failed page fetch ends this run early; everything
                    // settled so far is already durable and the process
                    // itself keeps going.
                    tracing::warn!(error = %e, "message source failed, ending run");
                    break;
                }
            };
            report.scanned += 1;

            if !message.has_media {
                continue;
            }
            if settled.contains(&message.id) {
                tracing::info!(id = message.id, "skip: already downloaded (recorded)");
                report.skipped_recorded += 1;
                continue;
            }
            if snapshot.contains(message.id) {
                tracing::info!(id = message.id, "skip: artifact already on disk, recording");
                writer.record(message.id).await?;
                settled.insert(message.id);
                report.skipped_existing += 1;
                continue;
            }

            match self.fetch_with_backoff(&message, &channel_dir).await {
                Ok(path) => {
                    report.downloaded += 1;
                    tracing::info!(
                        id = message.id,
                        n = report.downloaded,
                        path = %path.display(),
                        "saved"
                    );
                    writer.record(message.id).await?;
                    settled.insert(message.id);
                    if let Some(name) = path.file_name() {
                        snapshot.insert(name.to_string_lossy().into_owned());
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        id = message.id,
                        error = %e,
                        "download failed, deferred to a later run"
                    );
                    report.failed += 1;
                }
            }
        }

        writer.close().await?;
        tracing::info!(
            downloaded = report.downloaded,
            scanned = report.scanned,
            failed = report.failed,
            "sync finished"
        );
        Ok(report)
    }

    /// One fetch attempt, plus exactly one more after a rate-limit wait.
    ///
    /// The single retry bounds the total wait per message; a second
    /// rate-limit (or anything else) surfaces as a failure so persistent
    /// problems are visible instead of looping.
    async fn fetch_with_backoff(
        &self,
        message: &Message,
        dir: &Path,
    ) -> Result<PathBuf, FeedError> {
        match self.fetcher.fetch(message, dir).await {
            Err(FeedError::RateLimited { wait }) => {
                tracing::warn!(
                    id = message.id,
                    wait_secs = wait.as_secs(),
                    "rate limited, waiting before the single retry"
                );
                tokio::time::sleep(wait).await;
                self.fetcher.fetch(message, dir).await
            }
            other => other,
        }
    }
}
