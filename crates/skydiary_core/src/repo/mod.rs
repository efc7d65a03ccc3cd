//! Storage ports and their adapters.
//!
//! # Responsibility
//! - Define the post, tag and post-tag storage contracts used by services.
//! - Isolate SQLite query details from materialization and read use-cases.
//!
//! # Invariants
//! - Every adapter reports failures as `RepositoryError` with a code from the
//!   closed `RepositoryErrorCode` set.
//! - SQLite adapters never hold the connection lock across an `.await`;
//!   all port methods are synchronous.
//! - Async callers go through [`run_blocking`] so lock waits and disk I/O
//!   stay off the runtime's worker threads.
//!
//! # See also
//! - `memory`: in-process adapters with fault injection for tests.

use crate::db::SharedConnection;
use rusqlite::Connection;
use std::sync::MutexGuard;
use uuid::Uuid;

pub mod error;
pub mod memory;
pub mod post_repo;
pub mod post_tag_repo;
pub mod tag_repo;

pub use error::{RepoResult, RepositoryError, RepositoryErrorCode};
pub use memory::{
    InMemoryPostRepository, InMemoryPostTagRepository, InMemoryStore, InMemoryTagRepository,
    StoreOperation,
};
pub use post_repo::{PostRepository, SqlitePostRepository};
pub use post_tag_repo::{PostTagRepository, SqlitePostTagRepository};
pub use tag_repo::{SqliteTagRepository, TagRepository};

/// Runs a synchronous storage call on tokio's blocking pool.
///
/// A call that panics or is cancelled surfaces as a `System` error.
pub async fn run_blocking<T, F>(call: F) -> RepoResult<T>
where
    F: FnOnce() -> RepoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call).await.map_err(|err| {
        RepositoryError::with_cause(RepositoryErrorCode::System, "storage task failed", err)
    })?
}

pub(crate) fn lock_connection(conn: &SharedConnection) -> RepoResult<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| RepositoryError::poisoned())
}

/// Fails with `SyntaxOrAccess` unless `table` exists with every column.
pub(crate) fn ensure_schema(conn: &Connection, table: &str, columns: &[&str]) -> RepoResult<()> {
    if !table_exists(conn, table)? {
        return Err(RepositoryError::new(
            RepositoryErrorCode::SyntaxOrAccess,
            format!("table `{table}` is missing; run migrations first"),
        ));
    }

    for column in columns {
        if !table_has_column(conn, table, column)? {
            return Err(RepositoryError::new(
                RepositoryErrorCode::SyntaxOrAccess,
                format!("table `{table}` is missing column `{column}`"),
            ));
        }
    }
    Ok(())
}

pub(crate) fn parse_id(field: &str, text: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(text).map_err(|err| {
        RepositoryError::with_cause(
            RepositoryErrorCode::Data,
            format!("invalid uuid in `{field}`: `{text}`"),
            err,
        )
    })
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
