//! Open layer document handle.
//!
//! # Responsibility
//! - Own the in-memory SQLite connection of one layer.
//! - Run reads and transactional edits through the layer repository.
//! - Persist the layer atomically to its backing file.
//!
//! # Invariants
//! - One `edit` call is one transaction; a failing closure leaves no change.
//! - In-memory documents have no backing path and are never written.

use super::{StoreError, StoreResult};
use crate::db::{load_db, open_db_in_memory, persist_db};
use crate::names::Identifier;
use crate::repo::layer_repo::{
    LayerRepoError, LayerRepository, SqliteLayerRepository, IDENTIFIER_KEY,
};
use log::info;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Shared handle to one open document.
pub type DocumentRef = Arc<Document>;

/// One open layer document.
#[derive(Debug)]
pub struct Document {
    identifier: Option<Identifier>,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    dirty: AtomicBool,
}

impl Document {
    /// Creates an unsaved layer that only lives in memory.
    pub(crate) fn in_memory(identifier: Option<Identifier>) -> StoreResult<Self> {
        let conn = open_db_in_memory()?;
        if let Some(identifier) = &identifier {
            SqliteLayerRepository::try_new(&conn)?
                .set_layer_info(IDENTIFIER_KEY, &identifier.name())?;
        }
        Ok(Self {
            identifier,
            path: None,
            conn: Mutex::new(conn),
            dirty: AtomicBool::new(false),
        })
    }

    /// Loads an existing layer file.
    pub(crate) fn load(identifier: Identifier, path: PathBuf) -> StoreResult<Self> {
        let conn = load_db(&path).map_err(|source| StoreError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            identifier: Some(identifier),
            path: Some(path),
            conn: Mutex::new(conn),
            dirty: AtomicBool::new(false),
        })
    }

    /// Creates a new empty layer and writes it to `path` before returning.
    pub(crate) fn create(identifier: Identifier, path: PathBuf) -> StoreResult<Self> {
        let conn = open_db_in_memory()?;
        SqliteLayerRepository::try_new(&conn)?
            .set_layer_info(IDENTIFIER_KEY, &identifier.name())?;
        persist_db(&conn, &path).map_err(|source| StoreError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            identifier: Some(identifier),
            path: Some(path),
            conn: Mutex::new(conn),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    /// Backing file path, `None` for in-memory documents.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Identifier text for logs and value objects.
    pub fn display_id(&self) -> String {
        self.identifier
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), Identifier::name)
    }

    /// Whether edits were committed since the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Runs read-only repository calls against the layer.
    pub fn read<T, E>(
        &self,
        f: impl FnOnce(&SqliteLayerRepository<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<LayerRepoError>,
    {
        let conn = self.lock();
        let repo = SqliteLayerRepository::try_new(&conn)?;
        f(&repo)
    }

    /// Runs repository calls in one transaction, committing when `f` succeeds.
    pub fn edit<T, E>(
        &self,
        f: impl FnOnce(&SqliteLayerRepository<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<LayerRepoError>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(LayerRepoError::from)?;
        let value = {
            let repo = SqliteLayerRepository::try_new(&tx)?;
            f(&repo)?
        };
        tx.commit().map_err(LayerRepoError::from)?;
        self.dirty.store(true, Ordering::Release);
        Ok(value)
    }

    /// Writes the layer to its backing file.
    ///
    /// Returns `false` for in-memory documents, which have nothing to save.
    pub fn save(&self) -> StoreResult<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let started_at = Instant::now();
        let conn = self.lock();
        persist_db(&conn, path).map_err(|source| StoreError::Storage {
            path: path.clone(),
            source,
        })?;
        self.dirty.store(false, Ordering::Release);
        info!(
            "event=document_save module=store status=ok document={} duration_ms={}",
            self.display_id(),
            started_at.elapsed().as_millis()
        );
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
