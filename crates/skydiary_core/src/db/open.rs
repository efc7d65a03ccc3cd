//! Opening a `DbLocation` as a ready-to-use connection.

use super::migrations::apply_migrations;
use super::{share, DbError, DbLocation, DbResult, SharedConnection};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens `location`, applies pragmas and runs pending migrations.
///
/// A missing parent directory of a file database is created first.
pub fn open_at(location: &DbLocation) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = connect(location).and_then(|mut conn| {
        configure(&mut conn, location)?;
        apply_migrations(&mut conn)?;
        Ok(conn)
    });

    let elapsed_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok kind={} location={} duration_ms={}",
            location.kind(),
            location,
            elapsed_ms
        ),
        Err(err) => error!(
            "event=db_open module=db status=error kind={} location={} duration_ms={} error={}",
            location.kind(),
            location,
            elapsed_ms,
            err
        ),
    }
    result
}

pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_at(&DbLocation::file(path))
}

pub fn open_db_in_memory() -> DbResult<Connection> {
    open_at(&DbLocation::Memory)
}

pub fn open_shared_db(path: impl AsRef<Path>) -> DbResult<SharedConnection> {
    open_db(path).map(share)
}

pub fn open_shared_db_in_memory() -> DbResult<SharedConnection> {
    open_db_in_memory().map(share)
}

fn connect(location: &DbLocation) -> DbResult<Connection> {
    let opened = match location {
        DbLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            Connection::open(path)
        }
        DbLocation::Memory => Connection::open_in_memory(),
    };
    opened.map_err(|source| DbError::Open {
        location: location.clone(),
        source,
    })
}

fn configure(conn: &mut Connection, location: &DbLocation) -> DbResult<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    if let DbLocation::File(_) = location {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(
                "event=db_open module=db status=degraded location={} journal_mode={}",
                location, mode
            );
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    Ok(())
}
