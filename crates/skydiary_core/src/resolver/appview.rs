//! AppView-backed resolver (`app.bsky.feed.getPostThread`, depth 0).
//!
//! # Invariants
//! - Every request is bounded by the configured timeout; expiry maps to
//!   `TransportFailure`.
//! - HTTP 5xx and network errors are transport failures; HTTP 4xx and
//!   non-post thread nodes are unexpected shapes.

use super::{EmbedView, ExternalView, ImageView, RemoteViewResolver, ResolverError, VideoView};
use crate::model::event::POST_COLLECTION;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

pub const DEFAULT_APPVIEW_URL: &str = "https://public.api.bsky.app";
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

const THREAD_PATH: &str = "xrpc/app.bsky.feed.getPostThread";

/// HTTP resolver against a public AppView.
#[derive(Debug, Clone)]
pub struct AppViewResolver {
    client: reqwest::Client,
    base_url: Url,
}

impl AppViewResolver {
    /// Builds a resolver for `base_url` with a per-request `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ResolverError> {
        let mut base_url = Url::parse(base_url).map_err(|err| {
            ResolverError::transport(format!("invalid appview url `{base_url}`: {err}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("skydiary/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ResolverError::TransportFailure {
                message: "failed to build http client".to_string(),
                source: Some(err),
            })?;

        Ok(Self { client, base_url })
    }

    /// Request URL for one record's thread view.
    pub fn thread_url(&self, actor_id: &str, record_key: &str) -> Result<Url, ResolverError> {
        let mut url = self
            .base_url
            .join(THREAD_PATH)
            .map_err(|err| ResolverError::transport(format!("invalid thread url: {err}")))?;
        url.query_pairs_mut()
            .append_pair("uri", &record_uri(actor_id, record_key))
            .append_pair("depth", "0");
        Ok(url)
    }
}

/// Canonical `at://` locator of a post record.
pub fn record_uri(actor_id: &str, record_key: &str) -> String {
    format!("at://{actor_id}/{POST_COLLECTION}/{record_key}")
}

#[async_trait]
impl RemoteViewResolver for AppViewResolver {
    async fn resolve(&self, actor_id: &str, record_key: &str) -> Result<EmbedView, ResolverError> {
        let started_at = Instant::now();
        let url = self.thread_url(actor_id, record_key)?;

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        debug!(
            "event=view_resolve module=resolver status={} duration_ms={} body_bytes={}",
            status.as_u16(),
            started_at.elapsed().as_millis(),
            body.len()
        );

        if status.is_server_error() {
            return Err(ResolverError::transport(format!(
                "appview returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ResolverError::unexpected_shape(format!(
                "appview returned {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        parse_thread_response(&body)
    }
}

fn transport_error(err: reqwest::Error) -> ResolverError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        "request failed".to_string()
    };
    ResolverError::TransportFailure {
        message,
        source: Some(err),
    }
}

#[derive(Deserialize)]
struct ThreadResponse {
    thread: ThreadNode,
}

#[derive(Deserialize)]
#[serde(tag = "$type")]
enum ThreadNode {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    Post { post: PostViewWire },
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound,
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked,
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct PostViewWire {
    embed: Option<Value>,
}

#[derive(Deserialize)]
#[serde(tag = "$type")]
enum EmbedWire {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images { images: Vec<ImageWire> },
    #[serde(rename = "app.bsky.embed.video#view")]
    Video {
        playlist: String,
        thumbnail: Option<String>,
        alt: Option<String>,
    },
    #[serde(rename = "app.bsky.embed.external#view")]
    External { external: ExternalWire },
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia { media: Value },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ImageWire {
    thumb: String,
    fullsize: String,
    #[serde(default)]
    alt: String,
}

#[derive(Deserialize)]
struct ExternalWire {
    uri: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    thumb: Option<String>,
}

/// Extracts the embed view from a `getPostThread` response body.
pub(crate) fn parse_thread_response(body: &[u8]) -> Result<EmbedView, ResolverError> {
    let response: ThreadResponse = serde_json::from_slice(body)
        .map_err(|err| ResolverError::unexpected_shape(format!("undecodable thread: {err}")))?;

    match response.thread {
        ThreadNode::Post { post } => Ok(post.embed.map(embed_view).unwrap_or_default()),
        ThreadNode::NotFound => Err(ResolverError::unexpected_shape("post not found")),
        ThreadNode::Blocked => Err(ResolverError::unexpected_shape("post is blocked")),
        ThreadNode::Other => Err(ResolverError::unexpected_shape(
            "thread is not a thread view post",
        )),
    }
}

fn embed_view(raw: Value) -> EmbedView {
    let wire = match serde_json::from_value::<EmbedWire>(raw) {
        Ok(wire) => wire,
        Err(err) => {
            warn!("event=view_resolve module=resolver status=embed_skipped error={err}");
            return EmbedView::None;
        }
    };

    match wire {
        EmbedWire::Images { images } => EmbedView::Images(
            images
                .into_iter()
                .map(|image| ImageView {
                    thumb: image.thumb,
                    fullsize: image.fullsize,
                    alt: image.alt,
                })
                .collect(),
        ),
        EmbedWire::Video {
            playlist,
            thumbnail,
            alt,
        } => EmbedView::Video(VideoView {
            playlist,
            thumbnail,
            alt,
        }),
        EmbedWire::External { external } => EmbedView::External(ExternalView {
            uri: external.uri,
            title: external.title,
            description: external.description,
            thumb: external.thumb,
        }),
        // the quoted record itself is not rendered, only its media
        EmbedWire::RecordWithMedia { media } => embed_view(media),
        EmbedWire::Unknown => EmbedView::None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_thread_response, record_uri, AppViewResolver, DEFAULT_RESOLVE_TIMEOUT};
    use crate::resolver::{EmbedView, ResolverError};
    use serde_json::json;

    fn thread_with_embed(embed: serde_json::Value) -> Vec<u8> {
        json!({
            "thread": {
                "$type": "app.bsky.feed.defs#threadViewPost",
                "post": {
                    "uri": "at://did:plc:abc/app.bsky.feed.post/3k",
                    "cid": "bafy",
                    "author": { "did": "did:plc:abc", "handle": "a.test" },
                    "record": {},
                    "embed": embed,
                    "indexedAt": "2024-09-09T19:46:02.102Z"
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn thread_url_targets_post_thread_with_depth_zero() {
        let resolver =
            AppViewResolver::new("https://public.api.bsky.app", DEFAULT_RESOLVE_TIMEOUT).unwrap();
        let url = resolver.thread_url("did:plc:abc", "3k").unwrap();
        assert_eq!(url.path(), "/xrpc/app.bsky.feed.getPostThread");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("uri".to_string(), record_uri("did:plc:abc", "3k")),
                ("depth".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn images_view_is_extracted() {
        let body = thread_with_embed(json!({
            "$type": "app.bsky.embed.images#view",
            "images": [{ "thumb": "t", "fullsize": "f", "alt": "a" }]
        }));
        match parse_thread_response(&body).unwrap() {
            EmbedView::Images(images) => {
                assert_eq!(images.len(), 1);
                assert_eq!(images[0].thumb, "t");
                assert_eq!(images[0].alt, "a");
            }
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[test]
    fn record_with_media_yields_media_view() {
        let body = thread_with_embed(json!({
            "$type": "app.bsky.embed.recordWithMedia#view",
            "record": { "record": {} },
            "media": {
                "$type": "app.bsky.embed.external#view",
                "external": { "uri": "https://x.test", "title": "X", "description": "", "thumb": "th" }
            }
        }));
        match parse_thread_response(&body).unwrap() {
            EmbedView::External(card) => assert_eq!(card.thumb.as_deref(), Some("th")),
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[test]
    fn unknown_or_missing_embed_is_none() {
        let body = thread_with_embed(json!({ "$type": "app.bsky.embed.record#view", "record": {} }));
        assert_eq!(parse_thread_response(&body).unwrap(), EmbedView::None);

        let body = json!({
            "thread": { "$type": "app.bsky.feed.defs#threadViewPost", "post": { "uri": "u" } }
        })
        .to_string();
        assert_eq!(
            parse_thread_response(body.as_bytes()).unwrap(),
            EmbedView::None
        );
    }

    #[test]
    fn missing_or_blocked_posts_are_unexpected_shape() {
        for node in [
            json!({ "$type": "app.bsky.feed.defs#notFoundPost", "uri": "u", "notFound": true }),
            json!({ "$type": "app.bsky.feed.defs#blockedPost", "uri": "u", "blocked": true }),
            json!({ "$type": "app.bsky.feed.defs#somethingElse" }),
        ] {
            let body = json!({ "thread": node }).to_string();
            let err = parse_thread_response(body.as_bytes()).unwrap_err();
            assert!(matches!(err, ResolverError::UnexpectedShape { .. }));
        }

        let err = parse_thread_response(b"<html>").unwrap_err();
        assert!(matches!(err, ResolverError::UnexpectedShape { .. }));
    }
}
