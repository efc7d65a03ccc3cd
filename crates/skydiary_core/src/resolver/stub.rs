//! Scripted resolver for tests.
//!
//! Every call is recorded; use `OfflineViewResolver` in long-running processes.

use super::{EmbedView, RemoteViewResolver, ResolverError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

/// Failure mode injected into [`StubViewResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubFailure {
    Transport,
    UnexpectedShape,
}

#[derive(Debug, Default)]
struct StubState {
    view: EmbedView,
    failure: Option<StubFailure>,
    calls: Vec<(String, String)>,
}

/// Resolver returning a fixed view without network access.
///
/// Clones share state, so a test can keep one handle and move the other
/// into the materializer.
#[derive(Debug, Clone, Default)]
pub struct StubViewResolver {
    state: Arc<Mutex<StubState>>,
}

impl StubViewResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that always answers with `view`.
    pub fn with_view(view: EmbedView) -> Self {
        let resolver = Self::new();
        resolver.set_view(view);
        resolver
    }

    pub fn set_view(&self, view: EmbedView) {
        self.lock().view = view;
    }

    /// Makes every following call fail with `failure` (`None` clears it).
    pub fn set_failure(&self, failure: Option<StubFailure>) {
        self.lock().failure = failure;
    }

    /// `(actor_id, record_key)` pairs seen so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteViewResolver for StubViewResolver {
    async fn resolve(&self, actor_id: &str, record_key: &str) -> Result<EmbedView, ResolverError> {
        let mut state = self.lock();
        state
            .calls
            .push((actor_id.to_string(), record_key.to_string()));

        match state.failure {
            Some(StubFailure::Transport) => Err(ResolverError::transport("stub transport failure")),
            Some(StubFailure::UnexpectedShape) => {
                Err(ResolverError::unexpected_shape("stub unexpected shape"))
            }
            None => Ok(state.view.clone()),
        }
    }
}
