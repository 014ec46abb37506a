//! HTTP implementation of the feed collaborators.
//!
//! Speaks to a message-feed gateway:
//! - `GET /channels/resolve?target=T` → `{"id": N}`
//! - `GET /channels/{id}/messages?limit=P[&offset_id=M]` → newest-first page
//! - `GET /channels/{cid}/messages/{mid}/media` → attachment bytes
//! - `GET /dialogs` → channels visible to the gateway
//!
//! A 429 response is mapped to [`FeedError::RateLimited`] with the wait taken
//! from `Retry-After`. Media is streamed to a hidden `.part` file and renamed
//! into place on completion, so a crash never leaves a half-written artifact
//! under a name the filesystem probe would treat as settled.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::error::FeedError;
use super::{ChannelResolver, DialogEntity, MediaFetcher, Message, MessageSource};

/// Messages fetched per history page. Feed gateways cap pages at 100.
const PAGE_SIZE: usize = 100;

/// Fallback wait when a 429 arrives without a usable Retry-After header.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

pub struct HttpFeedClient {
    client: Client,
    base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    messages: Vec<MessageDto>,
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: i64,
    #[serde(default)]
    has_media: bool,
    date: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct DialogPage {
    dialogs: Vec<DialogEntity>,
}

impl HttpFeedClient {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Self {
        let base = base.into();
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn send(&self, url: &str) -> Result<Response, FeedError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| FeedError::Http {
            url: url.to_string(),
            source,
        })?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(FeedError::RateLimited {
                wait: retry_after(&response),
            }),
            status if !status.is_success() => Err(FeedError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => Ok(response),
        }
    }

    /// Fetch one page of history, newest first. `offset_id` asks for messages
    /// strictly older than that id.
    async fn fetch_page(
        &self,
        channel_id: i64,
        offset_id: Option<i64>,
        page_size: usize,
    ) -> Result<Vec<Message>, FeedError> {
        let mut url = format!(
            "{}/channels/{}/messages?limit={}",
            self.base, channel_id, page_size
        );
        if let Some(offset) = offset_id {
            url.push_str(&format!("&offset_id={}", offset));
        }
        let response = self.send(&url).await?;
        let page: MessagePage = response.json().await.map_err(|e| FeedError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(page
            .messages
            .into_iter()
            .map(|m| Message {
                channel_id,
                id: m.id,
                has_media: m.has_media,
                date: m.date,
            })
            .collect())
    }

    /// All channels visible to the gateway, for `--list-channels`.
    pub async fn dialogs(&self) -> Result<Vec<DialogEntity>, FeedError> {
        let url = format!("{}/dialogs", self.base);
        let response = self.send(&url).await?;
        let page: DialogPage = response.json().await.map_err(|e| FeedError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(page.dialogs)
    }
}

#[async_trait]
impl ChannelResolver for HttpFeedClient {
    async fn resolve(&self, target: &str) -> Result<i64, FeedError> {
        // A bare numeric target is already a channel id.
        if let Ok(id) = target.parse::<i64>() {
            return Ok(id);
        }

        let url = format!("{}/channels/resolve?target={}", self.base, target);
        let response = match self.send(&url).await {
            Ok(response) => response,
            Err(FeedError::Status { status: 404, .. }) => {
                return Err(FeedError::Resolve {
                    target: target.to_string(),
                    reason: "not found".to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        let resolved: ResolveResponse = response.json().await.map_err(|e| FeedError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(resolved.id)
    }
}

impl MessageSource for HttpFeedClient {
    fn messages(
        &self,
        channel_id: i64,
        limit: Option<usize>,
    ) -> BoxStream<'_, Result<Message, FeedError>> {
        // Paged pull: each state step fetches one page lazily, so the engine
        // starts working as soon as the first page arrives. A failed page
        // fetch yields the error once and ends the stream.
        let pages = stream::unfold(
            (None::<i64>, limit, false),
            move |(offset_id, remaining, failed)| async move {
                if failed || remaining == Some(0) {
                    return None;
                }
                let page_size = remaining.map_or(PAGE_SIZE, |r| r.min(PAGE_SIZE));
                match self.fetch_page(channel_id, offset_id, page_size).await {
                    Ok(messages) if messages.is_empty() => None,
                    Ok(mut messages) => {
                        if let Some(r) = remaining {
                            messages.truncate(r);
                        }
                        let next_offset = messages.iter().map(|m| m.id).min();
                        let next_remaining =
                            remaining.map(|r| r.saturating_sub(messages.len()));
                        let items: Vec<Result<Message, FeedError>> =
                            messages.into_iter().map(Ok).collect();
                        Some((stream::iter(items), (next_offset, next_remaining, false)))
                    }
                    Err(e) => Some((stream::iter(vec![Err(e)]), (offset_id, remaining, true))),
                }
            },
        );
        pages.flatten().boxed()
    }
}

#[async_trait]
impl MediaFetcher for HttpFeedClient {
    async fn fetch(&self, message: &Message, dir: &Path) -> Result<PathBuf, FeedError> {
        let url = format!(
            "{}/channels/{}/messages/{}/media",
            self.base, message.channel_id, message.id
        );
        let response = self.send(&url).await?;

        let extension = artifact_extension(&response);
        let final_path = dir.join(format!("{}.{}", message.id, extension));
        // Leading dot keeps the temp name outside the probe's `<id>.` prefix
        // space, so a crashed download is never mistaken for an artifact.
        let part_path = dir.join(format!(".{}.part", message.id));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part_path)
            .await?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| FeedError::Http {
                url: url.clone(),
                source,
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part_path, &final_path).await?;
        Ok(final_path)
    }
}

/// Wait prescribed by a 429 response.
fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
}

/// Pick the artifact extension: Content-Disposition filename first, then the
/// Content-Type subtype, else `bin`.
fn artifact_extension(response: &Response) -> String {
    if let Some(disposition) = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(rest) = disposition.split("filename=").nth(1) {
            let name = rest
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .trim_matches('"');
            if let Some((_, ext)) = name.rsplit_once('.') {
                if is_clean_extension(ext) {
                    return ext.to_ascii_lowercase();
                }
            }
        }
    }
    if let Some(content_type) = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        let subtype = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .split('/')
            .nth(1)
            .unwrap_or("");
        if is_clean_extension(subtype) {
            return subtype.to_ascii_lowercase();
        }
    }
    "bin".to_string()
}

fn is_clean_extension(s: &str) -> bool {
    !s.is_empty() && s.len() <= 8 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message_json(id: i64, has_media: bool) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "has_media": has_media,
            "date": "2024-05-01T12:00:00Z",
        })
    }

    #[test]
    fn test_is_clean_extension() {
        assert!(is_clean_extension("jpg"));
        assert!(is_clean_extension("mp4"));
        assert!(!is_clean_extension(""));
        assert!(!is_clean_extension("octet-stream"));
        assert!(!is_clean_extension("a/b"));
    }

    #[tokio::test]
    async fn test_resolve_numeric_target_without_network() {
        // Base URL is unreachable on purpose; numeric targets never hit it.
        let client = HttpFeedClient::new("http://127.0.0.1:1", None);
        assert_eq!(client.resolve("123456").await.unwrap(), 123456);
        assert_eq!(client.resolve("-1001234").await.unwrap(), -1001234);
    }

    #[tokio::test]
    async fn test_resolve_handle_via_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/resolve"))
            .and(query_param("target", "@news"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 42})),
            )
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        assert_eq!(client.resolve("@news").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_resolve_unknown_handle_is_resolve_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/resolve"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let err = client.resolve("@nobody").await.unwrap_err();
        assert!(matches!(err, FeedError::Resolve { .. }));
    }

    #[tokio::test]
    async fn test_messages_pages_until_empty() {
        let server = MockServer::start().await;
        // First page: newest messages, no offset.
        Mock::given(method("GET"))
            .and(path("/channels/7/messages"))
            .and(query_param_is_missing("offset_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [message_json(30, true), message_json(29, false)],
            })))
            .mount(&server)
            .await;
        // Second page: older than 29.
        Mock::given(method("GET"))
            .and(path("/channels/7/messages"))
            .and(query_param("offset_id", "29"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [message_json(12, true)],
            })))
            .mount(&server)
            .await;
        // History exhausted.
        Mock::given(method("GET"))
            .and(path("/channels/7/messages"))
            .and(query_param("offset_id", "12"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"messages": []})),
            )
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let collected: Vec<_> = client.messages(7, None).collect().await;
        let ids: Vec<i64> = collected.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![30, 29, 12]);
    }

    #[tokio::test]
    async fn test_messages_limit_bounds_the_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7/messages"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [message_json(30, true), message_json(29, true)],
            })))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let collected: Vec<_> = client.messages(7, Some(2)).collect().await;
        assert_eq!(collected.len(), 2);
        // No further page is requested once the limit is consumed; the only
        // mounted mock matches limit=2, so a second request would 404 and
        // surface as an error here.
        assert!(collected.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_messages_error_ends_stream_after_yielding_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let collected: Vec<_> = client.messages(7, None).collect().await;
        assert_eq!(collected.len(), 1);
        assert!(matches!(
            collected[0],
            Err(FeedError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7/messages/5/media"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let dir = tempfile::tempdir().unwrap();
        let message = Message {
            channel_id: 7,
            id: 5,
            has_media: true,
            date: chrono::Utc::now(),
        };
        let err = client.fetch(&message, dir.path()).await.unwrap_err();
        assert_eq!(err.rate_limit_wait(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_rate_limited_without_header_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dialogs"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let err = client.dialogs().await.unwrap_err();
        assert_eq!(err.rate_limit_wait(), Some(DEFAULT_RATE_LIMIT_WAIT));
    }

    #[tokio::test]
    async fn test_fetch_names_artifact_from_content_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7/messages/5/media"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"photo.JPG\"")
                    .set_body_bytes(b"media bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let dir = tempfile::tempdir().unwrap();
        let message = Message {
            channel_id: 7,
            id: 5,
            has_media: true,
            date: chrono::Utc::now(),
        };
        let path = client.fetch(&message, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("5.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"media bytes");
        // No leftover temp file.
        assert!(!dir.path().join(".5.part").exists());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7/messages/9/media"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"x".to_vec(), "image/png"))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let dir = tempfile::tempdir().unwrap();
        let message = Message {
            channel_id: 7,
            id: 9,
            has_media: true,
            date: chrono::Utc::now(),
        };
        let path = client.fetch(&message, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("9.png"));
    }

    #[tokio::test]
    async fn test_dialogs_parse_optional_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dialogs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dialogs": [
                    {"id": 1, "title": "Daily News"},
                    {"id": 2, "username": "bob"},
                    {"id": 3},
                ],
            })))
            .mount(&server)
            .await;

        let client = HttpFeedClient::new(server.uri(), None);
        let dialogs = client.dialogs().await.unwrap();
        assert_eq!(dialogs.len(), 3);
        assert_eq!(dialogs[0].title.as_deref(), Some("Daily News"));
        assert_eq!(dialogs[1].username.as_deref(), Some("bob"));
        assert!(dialogs[2].title.is_none());
    }
}
