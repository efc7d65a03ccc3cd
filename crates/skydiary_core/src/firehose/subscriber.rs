//! Long-lived feed subscription and frame dispatch.
//!
//! # Responsibility
//! - Connect to one feed host filtered to one actor's post records.
//! - Push every received frame into bounded queues consumed by a
//!   [`FrameSink`].
//! - Reconnect with exponential backoff, resuming from the last seen
//!   `time_us` cursor.
//!
//! # Invariants
//! - `DispatchMode::Serial` processes frames strictly in arrival order.
//! - `DispatchMode::Keyed` routes every frame of one `(actor, record_key)`
//!   to the same single-consumer queue, so per-record order is kept.
//! - Reading pauses while the target queue is full.
//! - After shutdown is signalled no new frame is read; queued frames get
//!   `shutdown_grace` to finish before workers are aborted.

use crate::firehose::codec::peek_frame;
use crate::model::event::POST_COLLECTION;
use crate::repo::{PostRepository, PostTagRepository};
use crate::resolver::RemoteViewResolver;
use crate::service::materializer::PostMaterializer;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIBE_PATH: &str = "subscribe";

/// Consumer of raw feed frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Handles one frame. Failures are the sink's to log; the feed moves on.
    async fn handle_frame(&self, frame: &[u8]);
}

#[async_trait]
impl<P, L, V> FrameSink for PostMaterializer<P, L, V>
where
    P: PostRepository + 'static,
    L: PostTagRepository + 'static,
    V: RemoteViewResolver,
{
    async fn handle_frame(&self, frame: &[u8]) {
        // outcome and failure are logged by `process`
        let _ = self.process(frame).await;
    }
}

/// How frames of one connection are spread over consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One consumer; frames are processed in arrival order.
    #[default]
    Serial,
    /// `workers` consumers keyed by `(actor, record_key)`.
    Keyed { workers: usize },
}

impl DispatchMode {
    fn worker_count(self) -> usize {
        match self {
            Self::Serial => 1,
            Self::Keyed { workers } => workers.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Feed endpoint, e.g. `wss://jetstream2.us-east.bsky.network`. A bare
    /// host name gets `wss://`.
    pub host: String,
    pub actor_id: String,
    pub dispatch: DispatchMode,
    pub queue_capacity: usize,
    pub shutdown_grace: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl SubscriptionOptions {
    pub fn new(host: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            actor_id: actor_id.into(),
            dispatch: DispatchMode::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[derive(Debug)]
pub enum FeedError {
    InvalidHost { host: String, details: String },
    Connect(tokio_tungstenite::tungstenite::Error),
    ConnectTimeout,
    Stream(tokio_tungstenite::tungstenite::Error),
    Task(tokio::task::JoinError),
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHost { host, details } => {
                write!(f, "invalid feed host `{host}`: {details}")
            }
            Self::Connect(err) => write!(f, "feed connect failed: {err}"),
            Self::ConnectTimeout => write!(f, "feed connect timed out"),
            Self::Stream(err) => write!(f, "feed stream failed: {err}"),
            Self::Task(err) => write!(f, "feed task failed: {err}"),
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connect(err) | Self::Stream(err) => Some(err),
            Self::Task(err) => Some(err),
            Self::InvalidHost { .. } | Self::ConnectTimeout => None,
        }
    }
}

/// Builds `{host}/subscribe?wantedCollections=app.bsky.feed.post&wantedDids=..[&cursor=..]`.
///
/// The collection is fixed: the codec accepts post records only.
pub fn subscription_url(
    host: &str,
    actor_id: &str,
    cursor: Option<i64>,
) -> Result<Url, FeedError> {
    let invalid = |details: String| FeedError::InvalidHost {
        host: host.to_string(),
        details,
    };

    let trimmed = host.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("wss://{trimmed}")
    };
    let mut base = Url::parse(&with_scheme).map_err(|err| invalid(err.to_string()))?;
    if !matches!(base.scheme(), "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme `{}`", base.scheme())));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base
        .join(SUBSCRIBE_PATH)
        .map_err(|err| invalid(err.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("wantedCollections", POST_COLLECTION);
        pairs.append_pair("wantedDids", actor_id);
        if let Some(cursor) = cursor {
            pairs.append_pair("cursor", &cursor.to_string());
        }
    }
    Ok(url)
}

enum SessionEnd {
    Shutdown,
    ServerClosed,
}

/// One feed connection with its dispatch workers.
pub struct FeedSubscriber<S: FrameSink + 'static> {
    options: SubscriptionOptions,
    sink: Arc<S>,
    cursor: Option<i64>,
}

impl<S: FrameSink + 'static> FeedSubscriber<S> {
    pub fn new(options: SubscriptionOptions, sink: Arc<S>) -> Self {
        Self {
            options,
            sink,
            cursor: None,
        }
    }

    /// Starts from `cursor` instead of the live tail.
    pub fn with_cursor(mut self, cursor: Option<i64>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Last `time_us` read from the feed.
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// Runs until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Connection failures and server closes are retried with backoff; only
    /// an invalid host is returned as an error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), FeedError> {
        subscription_url(
            &self.options.host,
            &self.options.actor_id,
            None,
        )?;

        let dispatcher = Dispatcher::start(
            self.options.dispatch,
            self.options.queue_capacity,
            Arc::clone(&self.sink),
        );
        let mut backoff = self.options.initial_backoff;

        loop {
            if stop_requested(false, &shutdown) {
                break;
            }

            let url = subscription_url(
                &self.options.host,
                &self.options.actor_id,
                self.cursor,
            )?;
            match self.session(&url, &dispatcher, &mut shutdown, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::ServerClosed) => {
                    info!(
                        "event=feed_closed module=firehose status=reconnecting host={} cursor={}",
                        self.options.host,
                        cursor_label(self.cursor)
                    );
                }
                Err(err) => {
                    warn!(
                        "event=feed_error module=firehose status=reconnecting host={} backoff_ms={} error={}",
                        self.options.host,
                        backoff.as_millis(),
                        err
                    );
                }
            }

            let stop = tokio::select! {
                _ = tokio::time::sleep(backoff) => false,
                changed = shutdown.changed() => stop_requested(changed.is_err(), &shutdown),
            };
            if stop {
                break;
            }
            backoff = (backoff * 2).min(self.options.max_backoff);
        }

        info!(
            "event=feed_shutdown module=firehose status=draining host={} grace_ms={}",
            self.options.host,
            self.options.shutdown_grace.as_millis()
        );
        dispatcher.drain(self.options.shutdown_grace).await;
        info!(
            "event=feed_shutdown module=firehose status=ok host={} cursor={}",
            self.options.host,
            cursor_label(self.cursor)
        );
        Ok(())
    }

    async fn session(
        &mut self,
        url: &Url,
        dispatcher: &Dispatcher,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Duration,
    ) -> Result<SessionEnd, FeedError> {
        let (mut stream, _) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| FeedError::ConnectTimeout)?
                .map_err(FeedError::Connect)?;
        *backoff = self.options.initial_backoff;
        info!(
            "event=feed_connect module=firehose status=ok host={} cursor={}",
            self.options.host,
            cursor_label(self.cursor)
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if stop_requested(changed.is_err(), shutdown) {
                        if let Err(err) = stream.close(None).await {
                            debug!("event=feed_close module=firehose status=error error={err}");
                        }
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.forward(text.into_bytes(), dispatcher).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        self.forward(data, dispatcher).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::ServerClosed),
                    // pings are answered by tungstenite itself
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(FeedError::Stream(err)),
                },
            }
        }
    }

    async fn forward(&mut self, frame: Vec<u8>, dispatcher: &Dispatcher) {
        let meta = peek_frame(&frame);
        if let Some(time_us) = meta.time_us {
            self.cursor = Some(time_us);
        }
        dispatcher
            .dispatch(route_key(meta.actor_id.as_deref(), meta.record_key.as_deref()), frame)
            .await;
    }
}

struct Dispatcher {
    senders: Vec<mpsc::Sender<Vec<u8>>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    fn start<S: FrameSink + 'static>(mode: DispatchMode, capacity: usize, sink: Arc<S>) -> Self {
        let count = mode.worker_count();
        let mut senders = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);

        for _ in 0..count {
            let (tx, mut rx) = mpsc::channel::<Vec<u8>>(capacity.max(1));
            let sink = Arc::clone(&sink);
            senders.push(tx);
            workers.push(tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    sink.handle_frame(&frame).await;
                }
            }));
        }

        Self { senders, workers }
    }

    async fn dispatch(&self, key: u64, frame: Vec<u8>) {
        let index = (key % self.senders.len() as u64) as usize;
        if self.senders[index].send(frame).await.is_err() {
            error!("event=feed_dispatch module=firehose status=error worker={index} reason=worker_gone");
        }
    }

    async fn drain(self, grace: Duration) {
        drop(self.senders);
        let deadline = tokio::time::Instant::now() + grace;
        for mut worker in self.workers {
            match tokio::time::timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("event=feed_drain module=firehose status=error error={err}");
                }
                Err(_) => {
                    warn!("event=feed_drain module=firehose status=timeout action=abort");
                    worker.abort();
                }
            }
        }
    }
}

/// Queue routing key; frames without a record key share key `0`.
fn route_key(actor_id: Option<&str>, record_key: Option<&str>) -> u64 {
    match (actor_id, record_key) {
        (Some(actor_id), Some(record_key)) => {
            let mut hasher = DefaultHasher::new();
            actor_id.hash(&mut hasher);
            record_key.hash(&mut hasher);
            hasher.finish()
        }
        _ => 0,
    }
}

/// A dropped sender counts as a shutdown request.
fn stop_requested(sender_gone: bool, shutdown: &watch::Receiver<bool>) -> bool {
    sender_gone || *shutdown.borrow()
}

fn cursor_label(cursor: Option<i64>) -> String {
    cursor.map_or_else(|| "live".to_string(), |cursor| cursor.to_string())
}

/// Runs one subscriber per host until shutdown and waits for all of them.
///
/// Returns the first error any subscriber ended with.
pub async fn run_feeds<S: FrameSink + 'static>(
    hosts: &[String],
    template: &SubscriptionOptions,
    sink: Arc<S>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), FeedError> {
    let mut tasks = Vec::with_capacity(hosts.len());
    for host in hosts {
        let options = SubscriptionOptions {
            host: host.clone(),
            ..template.clone()
        };
        let subscriber = FeedSubscriber::new(options, Arc::clone(&sink));
        tasks.push(tokio::spawn(subscriber.run(shutdown.clone())));
    }

    let mut first_error = None;
    for task in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(err) => Err(FeedError::Task(err)),
        };
        if let Err(err) = result {
            error!("event=feed_exit module=firehose status=error error={err}");
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
