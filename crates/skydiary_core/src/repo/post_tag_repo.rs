//! Post/tag link port and SQLite implementation.
//!
//! # Responsibility
//! - Attach a set of tag names to one post, creating tags on first sight.
//!
//! # Invariants
//! - `upsert_many` is idempotent: replaying the same names neither creates
//!   duplicate tags nor duplicate links.
//! - One `upsert_many` call is one transaction; on error nothing from that
//!   call is kept.
//! - The returned links follow the first-seen order of the requested names.

use crate::db::SharedConnection;
use crate::model::post::{PostId, PostTag, Tag};
use crate::repo::error::{RepoResult, RepositoryError, RepositoryErrorCode};
use crate::repo::{ensure_schema, lock_connection, parse_id};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

pub trait PostTagRepository: Send + Sync {
    /// Ensures every name exists as a tag and is linked to `post_id`.
    fn upsert_many(&self, post_id: PostId, names: &[String]) -> RepoResult<Vec<PostTag>>;
    /// Removes every link of `post_id`; returns removed row count.
    fn delete_by_post(&self, post_id: PostId) -> RepoResult<usize>;
}

#[derive(Clone)]
pub struct SqlitePostTagRepository {
    conn: SharedConnection,
}

impl SqlitePostTagRepository {
    pub fn try_new(conn: SharedConnection) -> RepoResult<Self> {
        {
            let guard = lock_connection(&conn)?;
            ensure_schema(&guard, "tags", &["id", "name"])?;
            ensure_schema(&guard, "post_tags", &["id", "post_id", "tag_id"])?;
        }
        Ok(Self { conn })
    }
}

impl PostTagRepository for SqlitePostTagRepository {
    fn upsert_many(&self, post_id: PostId, names: &[String]) -> RepoResult<Vec<PostTag>> {
        let names = dedup_names(names)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let post_id_text = post_id.to_string();
        let mut links = Vec::with_capacity(names.len());

        for name in names {
            let tag = upsert_tag(&tx, name)?;
            let tag_id_text = tag.id.to_string();
            tx.execute(
                "INSERT INTO post_tags (id, post_id, tag_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (post_id, tag_id) DO NOTHING;",
                params![Uuid::now_v7().to_string(), post_id_text, tag_id_text],
            )?;
            let link_id: String = tx.query_row(
                "SELECT id FROM post_tags WHERE post_id = ?1 AND tag_id = ?2;",
                [post_id_text.as_str(), tag_id_text.as_str()],
                |row| row.get(0),
            )?;
            links.push(PostTag {
                id: parse_id("post_tags.id", &link_id)?,
                post_id,
                tag,
            });
        }

        tx.commit().map_err(|err| {
            RepositoryError::with_cause(
                RepositoryErrorCode::Transaction,
                "failed to commit tag links",
                err,
            )
        })?;
        Ok(links)
    }

    fn delete_by_post(&self, post_id: PostId) -> RepoResult<usize> {
        let conn = lock_connection(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM post_tags WHERE post_id = ?1;",
            [post_id.to_string()],
        )?;
        Ok(removed)
    }
}

/// Drops repeated names, keeping first-seen order. Empty names are rejected.
pub(crate) fn dedup_names(names: &[String]) -> RepoResult<Vec<&str>> {
    let mut unique: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            return Err(RepositoryError::data("tag name must not be empty"));
        }
        if !unique.contains(&name.as_str()) {
            unique.push(name.as_str());
        }
    }
    Ok(unique)
}

fn upsert_tag(conn: &Connection, name: &str) -> RepoResult<Tag> {
    conn.execute(
        "INSERT INTO tags (id, name) VALUES (?1, ?2) ON CONFLICT (name) DO NOTHING;",
        params![Uuid::now_v7().to_string(), name],
    )?;
    let id_text: Option<String> = conn
        .query_row("SELECT id FROM tags WHERE name = ?1;", [name], |row| {
            row.get(0)
        })
        .optional()?;

    match id_text {
        Some(id_text) => Ok(Tag {
            id: parse_id("tags.id", &id_text)?,
            name: name.to_string(),
        }),
        None => Err(RepositoryError::new(
            RepositoryErrorCode::NotFound,
            format!("tag `{name}` vanished after upsert"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::dedup_names;
    use crate::repo::RepositoryErrorCode;

    #[test]
    fn dedup_keeps_first_seen_order() {
        let names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(dedup_names(&names).unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn blank_name_is_data_error() {
        let names = vec!["ok".to_string(), "  ".to_string()];
        let err = dedup_names(&names).unwrap_err();
        assert_eq!(err.code, RepositoryErrorCode::Data);
    }
}
