//! Error taxonomy for feed collaborators.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the message source, media fetcher or resolver.
///
/// Only [`FeedError::RateLimited`] is retried within a run (one bounded
/// wait-and-retry per message). Everything else leaves the message
/// unsettled; the next invocation naturally retries it because it was never
/// recorded in the ledger.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The provider asked us to back off for a prescribed duration.
    #[error("rate limited, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    /// The channel target could not be resolved. Fatal to the run.
    #[error("cannot resolve channel '{target}': {reason}")]
    Resolve { target: String, reason: String },

    /// Transport-level failure (connect, timeout, body decode).
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The gateway answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The gateway answered 2xx but the payload did not parse.
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Local filesystem failure while writing media.
    #[error("media write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// The backoff duration, when this is a rate-limit signal.
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimited { wait } => Some(*wait),
            _ => None,
        }
    }
}
