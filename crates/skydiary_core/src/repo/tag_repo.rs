//! Tag read port and SQLite implementation.
//!
//! Tags are only created through [`crate::repo::PostTagRepository::upsert_many`];
//! this port is read-only.

use crate::db::SharedConnection;
use crate::model::post::Tag;
use crate::repo::error::RepoResult;
use crate::repo::{ensure_schema, lock_connection, parse_id};
use rusqlite::Row;

pub trait TagRepository: Send + Sync {
    /// All tags ordered by name.
    fn list_all(&self) -> RepoResult<Vec<Tag>>;
    fn get_by_name(&self, name: &str) -> RepoResult<Option<Tag>>;
}

#[derive(Clone)]
pub struct SqliteTagRepository {
    conn: SharedConnection,
}

impl SqliteTagRepository {
    pub fn try_new(conn: SharedConnection) -> RepoResult<Self> {
        {
            let guard = lock_connection(&conn)?;
            ensure_schema(&guard, "tags", &["id", "name"])?;
        }
        Ok(Self { conn })
    }
}

impl TagRepository for SqliteTagRepository {
    fn list_all(&self) -> RepoResult<Vec<Tag>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name ASC, id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn get_by_name(&self, name: &str) -> RepoResult<Option<Tag>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare("SELECT id, name FROM tags WHERE name = ?1;")?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return parse_tag_row(row).map(Some);
        }
        Ok(None)
    }
}

pub(crate) fn parse_tag_row(row: &Row<'_>) -> RepoResult<Tag> {
    let id_text: String = row.get(0)?;
    Ok(Tag {
        id: parse_id("tags.id", &id_text)?,
        name: row.get(1)?,
    })
}
