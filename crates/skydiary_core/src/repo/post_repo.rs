//! Post repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Insert materialized posts and remove them on delete commits.
//! - Serve paginated listings for the read side.
//!
//! # Invariants
//! - `record_key` is unique; inserting an existing key fails with
//!   `UniqueViolation` instead of overwriting.
//! - Deleting a post cascades to its `post_tags` rows (schema-level).
//! - Listings are ordered by `posted_at DESC, id DESC`.

use crate::db::SharedConnection;
use crate::model::post::{NewPost, Post, PostByTagQuery, PostListQuery, PostPage};
use crate::repo::error::{RepoResult, RepositoryError};
use crate::repo::{ensure_schema, lock_connection, parse_id};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const POST_SELECT_SQL: &str = "SELECT
    posts.id AS id,
    posts.actor_id AS actor_id,
    posts.record_key AS record_key,
    posts.text AS text,
    posts.posted_at AS posted_at,
    posts.created_at AS created_at,
    posts.updated_at AS updated_at
FROM posts";

/// Storage port for mirrored posts.
pub trait PostRepository: Send + Sync {
    /// Inserts one post and returns the stored row.
    fn create(&self, post: &NewPost) -> RepoResult<Post>;
    /// Lists posts with optional substring filter on rendered text.
    fn list(&self, query: &PostListQuery) -> RepoResult<PostPage>;
    /// Lists posts linked to one tag.
    fn list_by_tag(&self, query: &PostByTagQuery) -> RepoResult<PostPage>;
    /// Deletes every post of `actor_id`; returns removed row count.
    fn delete_by_actor(&self, actor_id: &str) -> RepoResult<usize>;
    /// Deletes the post identified by `(actor_id, record_key)`; returns
    /// removed row count (0 or 1).
    fn delete_by_record(&self, actor_id: &str, record_key: &str) -> RepoResult<usize>;
}

/// SQLite-backed post repository.
#[derive(Clone)]
pub struct SqlitePostRepository {
    conn: SharedConnection,
}

impl SqlitePostRepository {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: SharedConnection) -> RepoResult<Self> {
        {
            let guard = lock_connection(&conn)?;
            ensure_schema(
                &guard,
                "posts",
                &[
                    "id",
                    "actor_id",
                    "record_key",
                    "text",
                    "posted_at",
                    "created_at",
                    "updated_at",
                ],
            )?;
        }
        Ok(Self { conn })
    }
}

impl PostRepository for SqlitePostRepository {
    fn create(&self, post: &NewPost) -> RepoResult<Post> {
        validate_new_post(post)?;

        let id = Uuid::now_v7();
        let now = Utc::now().timestamp_millis();
        let conn = lock_connection(&self.conn)?;
        conn.execute(
            "INSERT INTO posts (
                id,
                actor_id,
                record_key,
                text,
                posted_at,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
            params![
                id.to_string(),
                post.actor_id.as_str(),
                post.record_key.as_str(),
                post.text.as_str(),
                post.posted_at,
                now,
            ],
        )?;

        let mut stmt = conn.prepare(&format!("{POST_SELECT_SQL} WHERE posts.id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return parse_post_row(row);
        }

        Err(RepositoryError::data("created post not found in read-back"))
    }

    fn list(&self, query: &PostListQuery) -> RepoResult<PostPage> {
        let mut filter_sql = String::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(text) = query.text.as_deref().filter(|text| !text.is_empty()) {
            filter_sql.push_str(" WHERE posts.text LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(like_pattern(text)));
        }

        let conn = lock_connection(&self.conn)?;
        let count = count_rows(
            &conn,
            &format!("SELECT COUNT(*) FROM posts{filter_sql};"),
            &bind_values,
        )?;
        let items = select_page(
            &conn,
            &format!("{POST_SELECT_SQL}{filter_sql}"),
            bind_values,
            query.pagination.applied_limit(),
            query.pagination.offset(),
        )?;

        Ok(PostPage { items, count })
    }

    fn list_by_tag(&self, query: &PostByTagQuery) -> RepoResult<PostPage> {
        let join_sql = " INNER JOIN post_tags ON post_tags.post_id = posts.id
             WHERE post_tags.tag_id = ?";
        let bind_values = vec![Value::Text(query.tag_id.to_string())];

        let conn = lock_connection(&self.conn)?;
        let count = count_rows(
            &conn,
            &format!("SELECT COUNT(*) FROM posts{join_sql};"),
            &bind_values,
        )?;
        let items = select_page(
            &conn,
            &format!("{POST_SELECT_SQL}{join_sql}"),
            bind_values,
            query.pagination.applied_limit(),
            query.pagination.offset(),
        )?;

        Ok(PostPage { items, count })
    }

    fn delete_by_actor(&self, actor_id: &str) -> RepoResult<usize> {
        let conn = lock_connection(&self.conn)?;
        let removed = conn.execute("DELETE FROM posts WHERE actor_id = ?1;", [actor_id])?;
        Ok(removed)
    }

    fn delete_by_record(&self, actor_id: &str, record_key: &str) -> RepoResult<usize> {
        let conn = lock_connection(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM posts WHERE actor_id = ?1 AND record_key = ?2;",
            [actor_id, record_key],
        )?;
        Ok(removed)
    }
}

fn validate_new_post(post: &NewPost) -> RepoResult<()> {
    if post.actor_id.trim().is_empty() {
        return Err(RepositoryError::data("post actor_id must not be empty"));
    }
    if post.record_key.trim().is_empty() {
        return Err(RepositoryError::data("post record_key must not be empty"));
    }
    Ok(())
}

fn count_rows(conn: &Connection, sql: &str, bind_values: &[Value]) -> RepoResult<u64> {
    let count: i64 = conn.query_row(sql, params_from_iter(bind_values.iter()), |row| {
        row.get(0)
    })?;
    u64::try_from(count).map_err(|_| RepositoryError::data(format!("negative row count {count}")))
}

fn select_page(
    conn: &Connection,
    base_sql: &str,
    mut bind_values: Vec<Value>,
    limit: u32,
    offset: u64,
) -> RepoResult<Vec<Post>> {
    let sql = format!("{base_sql} ORDER BY posts.posted_at DESC, posts.id DESC LIMIT ? OFFSET ?;");
    bind_values.push(Value::Integer(i64::from(limit)));
    bind_values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut posts = Vec::new();
    while let Some(row) = rows.next()? {
        posts.push(parse_post_row(row)?);
    }
    Ok(posts)
}

/// Builds a `LIKE` pattern matching `text` literally anywhere.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn parse_post_row(row: &Row<'_>) -> RepoResult<Post> {
    let id_text: String = row.get("id")?;
    Ok(Post {
        id: parse_id("posts.id", &id_text)?,
        actor_id: row.get("actor_id")?,
        record_key: row.get("record_key")?,
        text: row.get("text")?,
        posted_at: row.get("posted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("#tech"), "%#tech%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
