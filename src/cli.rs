use clap::Parser;

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "chansync", about = "Mirror channel media attachments to local storage")]
pub struct Cli {
    /// Channel to sync: numeric ID or @handle
    #[arg(short = 'c', long)]
    pub channel: Option<String>,

    /// List channels visible to the gateway and exit
    #[arg(short = 'l', long)]
    pub list_channels: bool,

    /// Print per-channel ledger status for the output directory and exit
    #[arg(long)]
    pub status: bool,

    /// Base directory for downloaded media
    #[arg(short = 'o', long, default_value = "downloads")]
    pub output_dir: String,

    /// Maximum number of messages to scan (default: entire history)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Message-feed gateway base URL
    #[arg(long, env = "CHANSYNC_ENDPOINT", default_value = "http://127.0.0.1:8118")]
    pub endpoint: String,

    /// Gateway bearer token.
    /// WARNING: passing via --token is visible in process listings.
    /// Prefer the CHANSYNC_TOKEN environment variable instead.
    #[arg(long, env = "CHANSYNC_TOKEN")]
    pub token: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}
