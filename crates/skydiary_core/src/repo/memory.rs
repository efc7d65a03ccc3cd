//! In-process storage adapters.
//!
//! # Responsibility
//! - Provide the three storage ports over one shared in-memory state.
//! - Let tests inject a failure code per operation and inspect state.
//!
//! # Invariants
//! - Same uniqueness rules as the SQLite schema: `record_key`, tag `name`
//!   and `(post_id, tag_id)` are unique.
//! - Deleting a post removes its links.
//! - Ordering and pagination match the SQLite adapters.

use crate::model::post::{
    NewPost, Pagination, Post, PostByTagQuery, PostId, PostListQuery, PostPage, PostTag, Tag,
    TagId,
};
use crate::repo::error::{RepoResult, RepositoryError, RepositoryErrorCode};
use crate::repo::post_repo::PostRepository;
use crate::repo::post_tag_repo::{dedup_names, PostTagRepository};
use crate::repo::tag_repo::TagRepository;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Port operation that can be made to fail via [`InMemoryStore::set_fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    CreatePost,
    ListPosts,
    ListPostsByTag,
    DeletePostsByActor,
    DeletePostByRecord,
    ListTags,
    GetTagByName,
    UpsertPostTags,
    DeletePostTags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkRow {
    id: Uuid,
    post_id: PostId,
    tag_id: TagId,
}

#[derive(Debug, Default)]
struct StoreState {
    posts: Vec<Post>,
    tags: Vec<Tag>,
    links: Vec<LinkRow>,
    faults: HashMap<StoreOperation, RepositoryErrorCode>,
}

impl StoreState {
    fn check_fault(&self, operation: StoreOperation) -> RepoResult<()> {
        match self.faults.get(&operation) {
            Some(code) => Err(RepositoryError::new(
                *code,
                format!("injected fault for {operation:?}"),
            )),
            None => Ok(()),
        }
    }

    fn tag(&self, tag_id: TagId) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag.id == tag_id)
    }

    fn remove_posts(&mut self, keep: impl Fn(&Post) -> bool) -> usize {
        let before = self.posts.len();
        let mut removed_ids = Vec::new();
        self.posts.retain(|post| {
            let kept = keep(post);
            if !kept {
                removed_ids.push(post.id);
            }
            kept
        });
        self.links
            .retain(|link| !removed_ids.contains(&link.post_id));
        before - self.posts.len()
    }
}

/// Shared state behind the in-memory repositories.
///
/// Clones share state; hand one clone to each repository and keep one for
/// seeding and assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `operation` fail with `code` until cleared with `None`.
    pub fn set_fault(&self, operation: StoreOperation, code: Option<RepositoryErrorCode>) {
        let mut state = self.lock();
        match code {
            Some(code) => {
                state.faults.insert(operation, code);
            }
            None => {
                state.faults.remove(&operation);
            }
        }
    }

    /// Inserts a post row as-is, bypassing fault injection.
    pub fn seed_post(&self, post: Post) {
        self.lock().posts.push(post);
    }

    /// Inserts a tag row as-is, bypassing fault injection.
    pub fn seed_tag(&self, tag: Tag) {
        self.lock().tags.push(tag);
    }

    pub fn posts(&self) -> Vec<Post> {
        self.lock().posts.clone()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.lock().tags.clone()
    }

    /// Links resolved to their tags, in insertion order.
    pub fn post_tags(&self) -> Vec<PostTag> {
        let state = self.lock();
        state
            .links
            .iter()
            .filter_map(|link| {
                state.tag(link.tag_id).map(|tag| PostTag {
                    id: link.id,
                    post_id: link.post_id,
                    tag: tag.clone(),
                })
            })
            .collect()
    }

    pub fn post_repository(&self) -> InMemoryPostRepository {
        InMemoryPostRepository {
            store: self.clone(),
        }
    }

    pub fn tag_repository(&self) -> InMemoryTagRepository {
        InMemoryTagRepository {
            store: self.clone(),
        }
    }

    pub fn post_tag_repository(&self) -> InMemoryPostTagRepository {
        InMemoryPostTagRepository {
            store: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryPostRepository {
    store: InMemoryStore,
}

#[derive(Debug, Clone)]
pub struct InMemoryTagRepository {
    store: InMemoryStore,
}

#[derive(Debug, Clone)]
pub struct InMemoryPostTagRepository {
    store: InMemoryStore,
}

impl PostRepository for InMemoryPostRepository {
    fn create(&self, post: &NewPost) -> RepoResult<Post> {
        let mut state = self.store.lock();
        state.check_fault(StoreOperation::CreatePost)?;

        if post.actor_id.trim().is_empty() || post.record_key.trim().is_empty() {
            return Err(RepositoryError::data(
                "post actor_id and record_key must not be empty",
            ));
        }
        if state
            .posts
            .iter()
            .any(|existing| existing.record_key == post.record_key)
        {
            return Err(RepositoryError::new(
                RepositoryErrorCode::UniqueViolation,
                format!("post with record_key `{}` already exists", post.record_key),
            ));
        }

        let now = Utc::now().timestamp_millis();
        let created = Post {
            id: Uuid::now_v7(),
            actor_id: post.actor_id.clone(),
            record_key: post.record_key.clone(),
            text: post.text.clone(),
            posted_at: post.posted_at,
            created_at: now,
            updated_at: now,
        };
        state.posts.push(created.clone());
        Ok(created)
    }

    fn list(&self, query: &PostListQuery) -> RepoResult<PostPage> {
        let state = self.store.lock();
        state.check_fault(StoreOperation::ListPosts)?;

        let needle = query
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(str::to_ascii_lowercase);
        let matching = state
            .posts
            .iter()
            .filter(|post| match &needle {
                Some(needle) => post.text.to_ascii_lowercase().contains(needle.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        Ok(paginate(matching, query.pagination))
    }

    fn list_by_tag(&self, query: &PostByTagQuery) -> RepoResult<PostPage> {
        let state = self.store.lock();
        state.check_fault(StoreOperation::ListPostsByTag)?;

        let matching = state
            .posts
            .iter()
            .filter(|post| {
                state
                    .links
                    .iter()
                    .any(|link| link.post_id == post.id && link.tag_id == query.tag_id)
            })
            .cloned()
            .collect();
        Ok(paginate(matching, query.pagination))
    }

    fn delete_by_actor(&self, actor_id: &str) -> RepoResult<usize> {
        let mut state = self.store.lock();
        state.check_fault(StoreOperation::DeletePostsByActor)?;
        Ok(state.remove_posts(|post| post.actor_id != actor_id))
    }

    fn delete_by_record(&self, actor_id: &str, record_key: &str) -> RepoResult<usize> {
        let mut state = self.store.lock();
        state.check_fault(StoreOperation::DeletePostByRecord)?;
        Ok(state.remove_posts(|post| {
            !(post.actor_id == actor_id && post.record_key == record_key)
        }))
    }
}

impl TagRepository for InMemoryTagRepository {
    fn list_all(&self) -> RepoResult<Vec<Tag>> {
        let state = self.store.lock();
        state.check_fault(StoreOperation::ListTags)?;
        let mut tags = state.tags.clone();
        tags.sort_by(|left, right| left.name.cmp(&right.name).then(left.id.cmp(&right.id)));
        Ok(tags)
    }

    fn get_by_name(&self, name: &str) -> RepoResult<Option<Tag>> {
        let state = self.store.lock();
        state.check_fault(StoreOperation::GetTagByName)?;
        Ok(state.tags.iter().find(|tag| tag.name == name).cloned())
    }
}

impl PostTagRepository for InMemoryPostTagRepository {
    fn upsert_many(&self, post_id: PostId, names: &[String]) -> RepoResult<Vec<PostTag>> {
        let mut state = self.store.lock();
        state.check_fault(StoreOperation::UpsertPostTags)?;

        let names = dedup_names(names)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        if !state.posts.iter().any(|post| post.id == post_id) {
            return Err(RepositoryError::new(
                RepositoryErrorCode::ConstraintViolation,
                format!("post `{post_id}` does not exist"),
            ));
        }

        // staged on a copy so a failure leaves the store untouched
        let mut tags = state.tags.clone();
        let mut links = state.links.clone();
        let mut result = Vec::with_capacity(names.len());

        for name in names {
            let tag = match tags.iter().find(|tag| tag.name == name) {
                Some(tag) => tag.clone(),
                None => {
                    let tag = Tag {
                        id: Uuid::now_v7(),
                        name: name.to_string(),
                    };
                    tags.push(tag.clone());
                    tag
                }
            };

            let link_id = match links
                .iter()
                .find(|link| link.post_id == post_id && link.tag_id == tag.id)
            {
                Some(link) => link.id,
                None => {
                    let id = Uuid::now_v7();
                    links.push(LinkRow {
                        id,
                        post_id,
                        tag_id: tag.id,
                    });
                    id
                }
            };

            result.push(PostTag {
                id: link_id,
                post_id,
                tag,
            });
        }

        state.tags = tags;
        state.links = links;
        Ok(result)
    }

    fn delete_by_post(&self, post_id: PostId) -> RepoResult<usize> {
        let mut state = self.store.lock();
        state.check_fault(StoreOperation::DeletePostTags)?;
        let before = state.links.len();
        state.links.retain(|link| link.post_id != post_id);
        Ok(before - state.links.len())
    }
}

fn paginate(mut posts: Vec<Post>, pagination: Pagination) -> PostPage {
    posts.sort_by(|left, right| {
        right
            .posted_at
            .cmp(&left.posted_at)
            .then(right.id.cmp(&left.id))
    });
    let count = posts.len() as u64;
    let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
    let limit = pagination.applied_limit() as usize;
    let items = posts.into_iter().skip(offset).take(limit).collect();
    PostPage { items, count }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryStore, StoreOperation};
    use crate::model::post::{NewPost, PostListQuery};
    use crate::repo::{PostRepository, PostTagRepository, RepositoryErrorCode, TagRepository};

    fn new_post(record_key: &str, posted_at: i64) -> NewPost {
        NewPost {
            actor_id: "did:plc:abc".to_string(),
            record_key: record_key.to_string(),
            text: format!("<p>{record_key}</p>"),
            posted_at,
        }
    }

    #[test]
    fn duplicate_record_key_is_unique_violation() {
        let store = InMemoryStore::new();
        let posts = store.post_repository();
        posts.create(&new_post("3k1", 1)).unwrap();
        let err = posts.create(&new_post("3k1", 2)).unwrap_err();
        assert_eq!(err.code, RepositoryErrorCode::UniqueViolation);
        assert_eq!(store.posts().len(), 1);
    }

    #[test]
    fn upsert_is_idempotent_and_delete_cascades() {
        let store = InMemoryStore::new();
        let posts = store.post_repository();
        let links = store.post_tag_repository();
        let post = posts.create(&new_post("3k1", 1)).unwrap();

        let names = vec!["tech".to_string(), "life".to_string(), "tech".to_string()];
        let first = links.upsert_many(post.id, &names).unwrap();
        let second = links.upsert_many(post.id, &names).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(store.tags().len(), 2);
        assert_eq!(store.post_tags().len(), 2);

        assert_eq!(posts.delete_by_record("did:plc:abc", "3k1").unwrap(), 1);
        assert!(store.post_tags().is_empty());
        assert_eq!(store.tag_repository().list_all().unwrap().len(), 2);
    }

    #[test]
    fn injected_fault_surfaces_code_and_can_be_cleared() {
        let store = InMemoryStore::new();
        store.set_fault(StoreOperation::ListPosts, Some(RepositoryErrorCode::Connection));
        let err = store
            .post_repository()
            .list(&PostListQuery::default())
            .unwrap_err();
        assert_eq!(err.code, RepositoryErrorCode::Connection);

        store.set_fault(StoreOperation::ListPosts, None);
        assert_eq!(
            store
                .post_repository()
                .list(&PostListQuery::default())
                .unwrap()
                .count,
            0
        );
    }

    #[test]
    fn listing_is_newest_first() {
        let store = InMemoryStore::new();
        let posts = store.post_repository();
        posts.create(&new_post("old", 1)).unwrap();
        posts.create(&new_post("new", 2)).unwrap();
        let page = posts.list(&PostListQuery::default()).unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.items[0].record_key, "new");
    }
}
