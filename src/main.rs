//! chansync — incremental mirror of channel media attachments.
//!
//! Walks a channel's message history through a feed gateway and downloads
//! each attachment at most once, even across repeated or interrupted runs.
//! Progress is recorded in a per-channel append-only ledger, backed up by a
//! filesystem probe for artifacts a previous ledger-less run left behind.
//! Rate-limit signals suspend the loop for the prescribed wait and retry
//! once; other failures are deferred to the next run.

#![warn(clippy::all)]

mod cli;
mod config;
mod feed;
mod ledger;
mod probe;
mod select;
mod shutdown;
mod sync;
mod types;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Config;
use feed::{ChannelResolver, HttpFeedClient};
use sync::{SyncEngine, SyncOptions};

/// Print per-channel ledger status for every channel directory under the
/// output root. Purely local; never contacts the gateway.
async fn run_status(output_root: &Path) -> anyhow::Result<()> {
    if !output_root.exists() {
        println!("No download directory at {}", output_root.display());
        return Ok(());
    }

    let mut printed = false;
    let mut entries = tokio::fs::read_dir(output_root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(channel_id) = name.to_str().and_then(|s| s.parse::<i64>().ok()) else {
            continue;
        };
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let recorded = ledger::load(&dir).await.len();
        let mut artifacts = 0usize;
        let mut files = tokio::fs::read_dir(&dir).await?;
        while let Some(file) = files.next_entry().await? {
            let file_name = file.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name != ledger::LEDGER_FILE && !file_name.ends_with(".part") {
                artifacts += 1;
            }
        }

        println!(
            "Channel {}: {} recorded, {} files",
            channel_id, recorded, artifacts
        );
        printed = true;
    }

    if !printed {
        println!("No channel directories under {}", output_root.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = Config::from_cli(cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .init();

    if config.status {
        return run_status(&config.output_dir).await;
    }

    let client = HttpFeedClient::new(config.endpoint.clone(), config.token.clone());

    if config.list_channels {
        let dialogs = client.dialogs().await?;
        for entity in &dialogs {
            println!("{}", select::display_line(entity));
        }
        return Ok(());
    }

    let Some(target) = config.channel.as_deref() else {
        anyhow::bail!("--channel is required to sync");
    };
    // No ledger is touched before resolution succeeds.
    let channel_id = client.resolve(target).await?;
    tracing::info!(channel = target, channel_id, "resolved channel");

    let cancel = shutdown::install();
    let engine = SyncEngine::new(&client, &client, cancel);
    let report = engine
        .sync_channel(
            channel_id,
            &config.output_dir,
            &SyncOptions {
                limit: config.limit,
            },
        )
        .await?;

    if report.cancelled {
        tracing::info!("run stopped before the history was exhausted");
    }
    println!("Done. Total new files downloaded: {}", report.downloaded);
    Ok(())
}
