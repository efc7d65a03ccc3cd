//! Persisted post/tag model.
//!
//! # Responsibility
//! - Define rows owned by the storage ports (`posts`, `tags`, `post_tags`).
//! - Define pagination inputs and page envelopes shared by adapters.
//!
//! # Invariants
//! - `Post::record_key` is unique across the store.
//! - `Tag::name` is unique across the store.
//! - A `(post_id, tag.id)` pair appears at most once.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PostId = Uuid;
pub type TagId = Uuid;
pub type PostTagId = Uuid;

const PAGE_LIMIT_DEFAULT: u32 = 10;
const PAGE_LIMIT_MAX: u32 = 50;

/// Materialized post row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub actor_id: String,
    pub record_key: String,
    /// Rendered HTML markup, including embed markup.
    pub text: String,
    /// Author-declared creation time, epoch milliseconds.
    pub posted_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert payload for [`Post`]; ids and bookkeeping timestamps are assigned
/// by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub actor_id: String,
    pub record_key: String,
    pub text: String,
    pub posted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Link row between one post and one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTag {
    pub id: PostTagId,
    pub post_id: PostId,
    pub tag: Tag,
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: PAGE_LIMIT_DEFAULT,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Effective limit: `0` falls back to the default, large values clamp.
    pub fn applied_limit(&self) -> u32 {
        match self.limit {
            0 => PAGE_LIMIT_DEFAULT,
            value if value > PAGE_LIMIT_MAX => PAGE_LIMIT_MAX,
            value => value,
        }
    }

    /// Row offset; page `0` is treated as the first page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.applied_limit())
    }
}

/// Query for listing all posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostListQuery {
    pub pagination: Pagination,
    /// Substring match against rendered text.
    pub text: Option<String>,
}

/// Query for listing posts linked to one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostByTagQuery {
    pub pagination: Pagination,
    pub tag_id: TagId,
}

/// One page of posts plus the total matching row count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPage {
    pub items: Vec<Post>,
    pub count: u64,
}

impl PostPage {
    /// Well-formed empty page for callers that mask failures.
    pub fn empty() -> Self {
        Self::default()
    }
}
