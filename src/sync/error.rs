//! Run-level failures of the sync engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Fatal, run-level failures. Per-message download errors are handled inside
/// the engine loop and never surface here; they only appear in the report.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The channel directory could not be created.
    #[error("failed to prepare channel directory {path}: {source}")]
    Init {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The startup directory listing failed.
    #[error("failed to scan channel directory {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The ledger could not be opened or written. Without a working ledger
    /// the durability guarantee is void, so the run stops.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
