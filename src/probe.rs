//! Secondary dedup signal: artifacts already present on disk.
//!
//! Covers ledger/artifact divergence from a previous interrupted run — a
//! file that was downloaded but whose ID never made it into the ledger is
//! still recognized and settled without re-downloading.

use std::path::Path;

/// Directory listing taken once at sync start and extended in memory as new
/// artifacts are written, so existence checks never re-scan the filesystem.
#[derive(Debug, Default)]
pub struct DirSnapshot {
    names: Vec<String>,
}

impl DirSnapshot {
    pub async fn scan(dir: &Path) -> std::io::Result<Self> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(Self { names })
    }

    /// Whether an artifact for `id` already exists: an entry named exactly
    /// `"<id>"` or starting with `"<id>."`.
    pub fn contains(&self, id: i64) -> bool {
        let exact = id.to_string();
        let prefix = format!("{}.", id);
        self.names
            .iter()
            .any(|name| name == &exact || name.starts_with(&prefix))
    }

    /// Register a freshly written artifact without touching the filesystem.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    #[cfg(test)]
    fn from_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}
