//! Connection bootstrap and persistence utilities for layer documents.
//!
//! # Responsibility
//! - Open in-memory SQLite connections, optionally seeded from a layer file.
//! - Configure connection pragmas required by core behavior.
//! - Write in-memory layers back to disk through a temp file and rename.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.
//! - `persist_db` never leaves a truncated file at the destination path.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Opens an in-memory SQLite layer and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let mut conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=memory duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Loads a layer file into a fresh in-memory connection.
///
/// Edits made on the returned connection stay in memory until `persist_db`.
///
/// # Side effects
/// - Reads the whole file and upgrades its schema in memory.
/// - Emits `db_open` logging events with duration and status.
pub fn load_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=file path={}",
        path.display()
    );

    let result = Connection::open_in_memory()
        .and_then(|mut conn| {
            conn.restore(DatabaseName::Main, path, None::<fn(Progress)>)?;
            Ok(conn)
        })
        .map_err(DbError::from)
        .and_then(|mut conn| bootstrap_connection(&mut conn).map(|()| conn));

    match result {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok mode=file duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_load_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Writes the connection's main database to `path` atomically.
///
/// Parent directories are created when missing. The image is written to a
/// temp file in the destination directory and renamed over `path`.
pub fn persist_db(conn: &Connection, path: impl AsRef<Path>) -> DbResult<()> {
    let path = path.as_ref();
    let started_at = Instant::now();

    let result = write_image(conn, path);
    match &result {
        Ok(()) => info!(
            "event=db_persist module=db status=ok duration_ms={} path={}",
            started_at.elapsed().as_millis(),
            path.display()
        ),
        Err(err) => error!(
            "event=db_persist module=db status=error duration_ms={} error_code=db_persist_failed error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn write_image(conn: &Connection, path: &Path) -> DbResult<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(|source| DbError::Io {
        path: directory.to_path_buf(),
        source,
    })?;

    let staging = NamedTempFile::new_in(directory).map_err(|source| DbError::Io {
        path: directory.to_path_buf(),
        source,
    })?;
    conn.backup(DatabaseName::Main, staging.path(), None)?;
    staging.persist(path).map_err(|err| DbError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)?;
    Ok(())
}
