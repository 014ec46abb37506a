//! Message-feed collaborators: the message source, media fetcher and channel
//! resolver the sync engine depends on.
//!
//! The traits here are the seam between the engine and the transport. The
//! engine never talks HTTP itself; it pulls a lazy message stream and hands
//! individual messages back for fetching. [`HttpFeedClient`] implements all
//! three against a message-feed gateway.

pub mod error;
pub mod http;

pub use error::FeedError;
pub use http::HttpFeedClient;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::Deserialize;

/// One message observed in a channel's history.
///
/// `id` is channel-scoped and monotonically increasing; a message never
/// changes once observed. Only messages with `has_media` are download
/// candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel_id: i64,
    pub id: i64,
    pub has_media: bool,
    pub date: DateTime<Utc>,
}

/// One entry from the gateway's dialog listing.
///
/// Which naming attribute is present depends on the entity kind; see
/// [`crate::select`] for the labelling precedence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogEntity {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Resolves an opaque channel target (numeric ID or @handle) to the numeric
/// channel ID the engine names its on-disk state after.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve(&self, target: &str) -> Result<i64, FeedError>;
}

/// Produces a lazy, newest-first message history for a channel.
///
/// The order must be consistent across runs so a scan limit has a stable
/// meaning. The stream is finite when `limit` is given; otherwise it runs
/// until the channel's history is exhausted. It is not restartable.
pub trait MessageSource: Send + Sync {
    fn messages(
        &self,
        channel_id: i64,
        limit: Option<usize>,
    ) -> BoxStream<'_, Result<Message, FeedError>>;
}

/// Retrieves a message's attachment bytes into a target directory.
///
/// The returned path's filename is prefixed by the message ID, which is what
/// the filesystem probe keys on. Fails with [`FeedError::RateLimited`] when
/// the provider signals backoff.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, message: &Message, dir: &Path) -> Result<PathBuf, FeedError>;
}
