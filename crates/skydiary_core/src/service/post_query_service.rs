//! Read-side post/tag listing use-cases.
//!
//! # Invariants
//! - Unknown tag names fall back to a text search for `#<name>`, so posts
//!   whose tag links were never written still show up.
//! - Failures keep their repository cause; callers that prefer an empty
//!   listing can map errors to `PostPage::empty()`.

use crate::model::post::{Pagination, PostByTagQuery, PostListQuery, PostPage, Tag};
use crate::repo::{PostRepository, TagRepository};
use crate::service::error::ApplicationError;
use log::debug;

pub const LIST_POSTS: &str = "listPosts";
pub const LIST_POSTS_BY_TAG_NAME: &str = "listPostsByTagName";
pub const LIST_TAGS: &str = "listTags";

pub struct PostQueryService<P: PostRepository, T: TagRepository> {
    posts: P,
    tags: T,
}

impl<P: PostRepository, T: TagRepository> PostQueryService<P, T> {
    pub fn new(posts: P, tags: T) -> Self {
        Self { posts, tags }
    }

    /// Lists posts newest first, optionally filtered by a text substring.
    pub fn list_posts(
        &self,
        pagination: Pagination,
        text: Option<&str>,
    ) -> Result<PostPage, ApplicationError> {
        self.posts
            .list(&PostListQuery {
                pagination,
                text: text.map(str::to_string),
            })
            .map_err(|err| ApplicationError::new(LIST_POSTS, "Failed to list posts", err))
    }

    /// Lists posts linked to the tag called `name`.
    pub fn list_posts_by_tag_name(
        &self,
        name: &str,
        pagination: Pagination,
    ) -> Result<PostPage, ApplicationError> {
        let tag = self.tags.get_by_name(name).map_err(|err| {
            ApplicationError::new(LIST_POSTS_BY_TAG_NAME, "Failed to find tag", err)
        })?;

        let result = match tag {
            Some(tag) => self.posts.list_by_tag(&PostByTagQuery {
                pagination,
                tag_id: tag.id,
            }),
            None => {
                debug!("event=list_by_tag module=service status=fallback reason=tag_not_found");
                self.posts.list(&PostListQuery {
                    pagination,
                    text: Some(format!("#{name}")),
                })
            }
        };

        result.map_err(|err| {
            ApplicationError::new(LIST_POSTS_BY_TAG_NAME, "Failed to list posts", err)
        })
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>, ApplicationError> {
        self.tags
            .list_all()
            .map_err(|err| ApplicationError::new(LIST_TAGS, "Failed to list tags", err))
    }
}
