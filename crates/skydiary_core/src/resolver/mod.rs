//! Remote view resolution for freshly created records.
//!
//! # Responsibility
//! - Define the resolver seam used by the materializer.
//! - Define the embed view shapes the renderer understands.
//!
//! # Invariants
//! - One `resolve` call performs at most one network read.
//! - At most one embed is returned; unrecognized embed kinds yield
//!   `EmbedView::None`, never an error.
//!
//! # See also
//! - `appview`: HTTP implementation against the public AppView.
//! - `offline`: stateless implementation for runs without AppView access.
//! - `stub`: scripted implementation for tests.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod appview;
pub mod offline;
pub mod stub;

pub use appview::AppViewResolver;
pub use offline::OfflineViewResolver;
pub use stub::StubViewResolver;

/// Rendered embed attached to a post view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EmbedView {
    #[default]
    None,
    Images(Vec<ImageView>),
    Video(VideoView),
    External(ExternalView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageView {
    pub thumb: String,
    pub fullsize: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoView {
    /// HLS playlist URL.
    pub playlist: String,
    pub thumbnail: Option<String>,
    pub alt: Option<String>,
}

/// Link preview card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalView {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: Option<String>,
}

#[derive(Debug)]
pub enum ResolverError {
    /// Network failure, timeout or server-side error.
    TransportFailure {
        message: String,
        source: Option<reqwest::Error>,
    },
    /// The response is not a standard post view (deleted, blocked, missing
    /// actor, or undecodable body).
    UnexpectedShape { details: String },
}

impl ResolverError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
            source: None,
        }
    }

    pub fn unexpected_shape(details: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            details: details.into(),
        }
    }

    /// Stable error code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransportFailure { .. } => "transport_failure",
            Self::UnexpectedShape { .. } => "unexpected_shape",
        }
    }
}

impl Display for ResolverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportFailure { message, .. } => {
                write!(f, "post view transport failure: {message}")
            }
            Self::UnexpectedShape { details } => write!(f, "unexpected post view: {details}"),
        }
    }
}

impl Error for ResolverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TransportFailure {
                source: Some(err), ..
            } => Some(err),
            _ => None,
        }
    }
}

/// Fetches the server-rendered view of a record.
#[async_trait]
pub trait RemoteViewResolver: Send + Sync {
    /// Resolves the embed of `record_key` in `actor_id`'s post collection.
    async fn resolve(&self, actor_id: &str, record_key: &str) -> Result<EmbedView, ResolverError>;
}
