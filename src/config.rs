use std::path::PathBuf;

use crate::types::LogLevel;

/// Application configuration, derived from the parsed CLI surface.
pub struct Config {
    pub channel: Option<String>,
    pub output_dir: PathBuf,
    pub endpoint: String,
    pub token: Option<String>,
    pub limit: Option<usize>,
    pub list_channels: bool,
    pub status: bool,
    pub log_level: LogLevel,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("channel", &self.channel)
            .field("output_dir", &self.output_dir)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("limit", &self.limit)
            .field("list_channels", &self.list_channels)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> anyhow::Result<Self> {
        if cli.channel.is_none() && !cli.list_channels && !cli.status {
            anyhow::bail!("either --channel, --list-channels or --status must be provided");
        }

        let endpoint = cli.endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            anyhow::bail!("--endpoint must not be empty");
        }

        if cli.limit == Some(0) {
            anyhow::bail!("--limit must be at least 1 (omit it to scan the entire history)");
        }

        Ok(Self {
            channel: cli.channel,
            output_dir: expand_tilde(&cli.output_dir),
            endpoint,
            token: cli.token,
            limit: cli.limit,
            list_channels: cli.list_channels,
            status: cli.status,
            log_level: cli.log_level,
        })
    }
}
