//! Post materialization use-case (`processFirehose`).
//!
//! # Responsibility
//! - Turn one raw feed frame into stored state: a post with its tag links on
//!   create, removed post rows on delete.
//! - Wrap every lower-layer failure into an `ApplicationError` naming the
//!   stage that failed.
//!
//! # Invariants
//! - A create persists at most one post row; duplicates of an existing
//!   `record_key` fail with `UniqueViolation` and leave the store unchanged.
//! - Tag links are written only after the post row exists. A link failure
//!   leaves the post in place and is still reported as an error.
//! - Deleting a missing post is a successful no-op (`removed = 0`).
//! - No retries happen here; each frame is processed exactly once.
//! - Storage calls run through `run_blocking`, never on the async worker
//!   that polls `process`.

use crate::firehose::codec;
use crate::model::event::{Commit, CommitEvent, CreateCommit};
use crate::model::post::{NewPost, Post, PostTag};
use crate::render::{compose_post_markup, render, RenderOptions};
use crate::repo::{run_blocking, PostRepository, PostTagRepository};
use crate::resolver::RemoteViewResolver;
use crate::service::error::ApplicationError;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

pub const PROCESS_FIREHOSE: &str = "processFirehose";

pub const PARSE_FAILED: &str = "Failed to parse event";
pub const RESOLVE_FAILED: &str = "Failed to resolve post view";
pub const CREATE_FAILED: &str = "Failed to create post";
pub const LINK_FAILED: &str = "Failed to link tags";
pub const DELETE_FAILED: &str = "Failed to delete post";

/// Which rows a delete commit removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteScope {
    /// Only the post addressed by the commit's `(actor, record_key)`.
    #[default]
    Record,
    /// Every post of the commit's actor.
    Actor,
}

#[derive(Debug, Clone, Default)]
pub struct MaterializerOptions {
    pub render: RenderOptions,
    pub delete_scope: DeleteScope,
}

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    Created { post: Post, tags: Vec<PostTag> },
    Deleted { removed: usize },
}

/// Feed-to-store pipeline over the post and link ports plus a view resolver.
pub struct PostMaterializer<P, L, V>
where
    P: PostRepository + 'static,
    L: PostTagRepository + 'static,
    V: RemoteViewResolver,
{
    posts: Arc<P>,
    links: Arc<L>,
    resolver: V,
    options: MaterializerOptions,
}

impl<P, L, V> PostMaterializer<P, L, V>
where
    P: PostRepository + 'static,
    L: PostTagRepository + 'static,
    V: RemoteViewResolver,
{
    pub fn new(posts: P, links: L, resolver: V) -> Self {
        Self::with_options(posts, links, resolver, MaterializerOptions::default())
    }

    pub fn with_options(posts: P, links: L, resolver: V, options: MaterializerOptions) -> Self {
        Self {
            posts: Arc::new(posts),
            links: Arc::new(links),
            resolver,
            options,
        }
    }

    pub fn options(&self) -> &MaterializerOptions {
        &self.options
    }

    /// Processes one raw frame end to end.
    ///
    /// # Errors
    /// Returns `ApplicationError { usecase: "processFirehose", .. }` with the
    /// failing stage as message and the original error as cause.
    pub async fn process(&self, frame: &[u8]) -> Result<MaterializeOutcome, ApplicationError> {
        let started_at = Instant::now();
        let event = codec::decode(frame).map_err(|err| {
            let err = ApplicationError::new(PROCESS_FIREHOSE, PARSE_FAILED, err);
            let meta = codec::peek_frame(frame);
            warn!(
                "event=materialize module=service status=error stage=decode record_key={} error_code={}",
                meta.record_key.as_deref().unwrap_or("unknown"),
                err.cause_code()
            );
            err
        })?;

        let result = self.apply(&event).await;
        match &result {
            Ok(outcome) => info!(
                "event=materialize module=service status=ok op={} record_key={} {} duration_ms={}",
                event.operation(),
                event.record_key(),
                outcome_summary(outcome),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=materialize module=service status=error op={} record_key={} stage=\"{}\" error_code={} duration_ms={}",
                event.operation(),
                event.record_key(),
                err.message,
                err.cause_code(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Applies an already decoded event.
    pub async fn apply(&self, event: &CommitEvent) -> Result<MaterializeOutcome, ApplicationError> {
        match &event.commit {
            Commit::Create(create) => self.create(&event.actor_id, create).await,
            Commit::Delete(delete) => self.delete(&event.actor_id, &delete.record_key).await,
        }
    }

    async fn create(
        &self,
        actor_id: &str,
        commit: &CreateCommit,
    ) -> Result<MaterializeOutcome, ApplicationError> {
        let record = &commit.record;
        let rendered = render(&record.text, &record.facets, &self.options.render);

        let view = self
            .resolver
            .resolve(actor_id, &commit.record_key)
            .await
            .map_err(|err| ApplicationError::new(PROCESS_FIREHOSE, RESOLVE_FAILED, err))?;
        let markup = compose_post_markup(&rendered.markup, &view);

        let new_post = NewPost {
            actor_id: actor_id.to_string(),
            record_key: commit.record_key.clone(),
            text: markup,
            posted_at: record.created_at_ms,
        };
        let posts = Arc::clone(&self.posts);
        let post = run_blocking(move || posts.create(&new_post))
            .await
            .map_err(|err| ApplicationError::new(PROCESS_FIREHOSE, CREATE_FAILED, err))?;

        if rendered.tags.is_empty() {
            return Ok(MaterializeOutcome::Created {
                post,
                tags: Vec::new(),
            });
        }

        let tag_count = rendered.tags.len();
        let links = Arc::clone(&self.links);
        let post_id = post.id;
        let names = rendered.tags;
        let tags = run_blocking(move || links.upsert_many(post_id, &names))
            .await
            .map_err(|err| {
                warn!(
                    "event=tag_link module=service status=error post_id={} record_key={} tag_count={} error_code={}",
                    post.id, post.record_key, tag_count, err.code
                );
                ApplicationError::new(PROCESS_FIREHOSE, LINK_FAILED, err)
            })?;
        debug!(
            "event=tag_link module=service status=ok post_id={} link_count={}",
            post.id,
            tags.len()
        );

        Ok(MaterializeOutcome::Created { post, tags })
    }

    async fn delete(
        &self,
        actor_id: &str,
        record_key: &str,
    ) -> Result<MaterializeOutcome, ApplicationError> {
        let posts = Arc::clone(&self.posts);
        let scope = self.options.delete_scope;
        let actor_id = actor_id.to_string();
        let record_key = record_key.to_string();
        let removed = run_blocking(move || match scope {
            DeleteScope::Record => posts.delete_by_record(&actor_id, &record_key),
            DeleteScope::Actor => posts.delete_by_actor(&actor_id),
        })
        .await
        .map_err(|err| ApplicationError::new(PROCESS_FIREHOSE, DELETE_FAILED, err))?;

        Ok(MaterializeOutcome::Deleted { removed })
    }
}

fn outcome_summary(outcome: &MaterializeOutcome) -> String {
    match outcome {
        MaterializeOutcome::Created { post, tags } => {
            format!("post_id={} tag_count={}", post.id, tags.len())
        }
        MaterializeOutcome::Deleted { removed } => format!("removed={removed}"),
    }
}
