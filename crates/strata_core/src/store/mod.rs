//! Document store adapter.
//!
//! # Responsibility
//! - Resolve identifiers to layer files under the current repository root.
//! - Fetch-or-create layer documents and cache open handles per session.
//! - Save dirty documents explicitly, on `close`, and on drop.
//!
//! # Invariants
//! - The repository root is read at the start of every `fetch`.
//! - At most one open handle per resolved path per store.
//! - A created document exists on disk as a complete file before `fetch` returns.

use crate::db::DbError;
use crate::define::define_keyed;
use crate::locator::{LocatorError, RepositoryLocator};
use crate::names::Identifier;
use crate::repo::layer_repo::LayerRepoError;
use log::{error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

mod document;

pub use document::{Document, DocumentRef};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from document store operations.
#[derive(Debug)]
pub enum StoreError {
    /// No repository root is set for this session.
    RepositoryNotSet,
    /// Document is absent and creation was not requested.
    DocumentNotFound { identifier: String, path: PathBuf },
    /// Reading or writing the document file failed.
    Storage { path: PathBuf, source: DbError },
    /// In-memory layer bootstrap failed.
    Db(DbError),
    /// Layer repository failure.
    Repo(LayerRepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RepositoryNotSet => write!(f, "repository root is not set"),
            Self::DocumentNotFound { identifier, path } => write!(
                f,
                "document `{identifier}` not found at {}",
                path.display()
            ),
            Self::Storage { path, source } => {
                write!(f, "storage failure at {}: {source}", path.display())
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::RepositoryNotSet | Self::DocumentNotFound { .. } => None,
        }
    }
}

impl From<LocatorError> for StoreError {
    fn from(value: LocatorError) -> Self {
        match value {
            LocatorError::RepositoryNotSet => Self::RepositoryNotSet,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<LayerRepoError> for StoreError {
    fn from(value: LayerRepoError) -> Self {
        Self::Repo(value)
    }
}

/// Session-scoped cache of open documents under one repository locator.
#[derive(Debug)]
pub struct DocumentStore {
    locator: RepositoryLocator,
    open: Mutex<HashMap<PathBuf, DocumentRef>>,
}

impl DocumentStore {
    pub fn new(locator: RepositoryLocator) -> Self {
        Self {
            locator,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn locator(&self) -> &RepositoryLocator {
        &self.locator
    }

    /// Resolves `identifier` to its file path under the current root.
    pub fn resolve(&self, identifier: &Identifier) -> StoreResult<PathBuf> {
        Ok(self.locator.get()?.join(identifier.name()))
    }

    /// Returns the open handle for `identifier`, loading or creating it.
    ///
    /// # Errors
    /// - `RepositoryNotSet` when the locator has no root.
    /// - `DocumentNotFound` when absent and `create_if_missing` is false.
    /// - `Storage` on file system or load failures.
    pub fn fetch(
        &self,
        identifier: &Identifier,
        create_if_missing: bool,
    ) -> StoreResult<DocumentRef> {
        let started_at = Instant::now();
        let path = self.resolve(identifier)?;
        let mut open = self.lock_open();

        let result = define_keyed(
            || -> StoreResult<Option<DocumentRef>> {
                if let Some(document) = open.get(&path) {
                    return Ok(Some(Arc::clone(document)));
                }
                if path.is_file() {
                    return Document::load(identifier.clone(), path.clone())
                        .map(|document| Some(Arc::new(document)));
                }
                Ok(None)
            },
            Ok,
            || {
                if !create_if_missing {
                    return Err(StoreError::DocumentNotFound {
                        identifier: identifier.name(),
                        path: path.clone(),
                    });
                }
                Document::create(identifier.clone(), path.clone()).map(Arc::new)
            },
        );

        match result {
            Ok(defined) => {
                let outcome = if defined.is_created() { "created" } else { "opened" };
                let document = defined.into_inner();
                open.entry(path.clone())
                    .or_insert_with(|| Arc::clone(&document));
                info!(
                    "event=document_fetch module=store status=ok outcome={} path={} duration_ms={}",
                    outcome,
                    path.display(),
                    started_at.elapsed().as_millis()
                );
                Ok(document)
            }
            Err(err) => {
                error!(
                    "event=document_fetch module=store status=error path={} duration_ms={} error={}",
                    path.display(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Creates an unsaved, uncached document.
    pub fn create_in_memory(&self, identifier: Option<Identifier>) -> StoreResult<DocumentRef> {
        Document::in_memory(identifier).map(Arc::new)
    }

    /// Whether `identifier` resolves to a document open in this store.
    pub fn is_open(&self, identifier: &Identifier) -> StoreResult<bool> {
        let path = self.resolve(identifier)?;
        Ok(self.lock_open().contains_key(&path))
    }

    /// Saves every dirty open document, returning how many were written.
    pub fn save_all(&self) -> StoreResult<usize> {
        let documents = self.lock_open().values().cloned().collect::<Vec<_>>();
        let mut saved = 0;
        for document in documents.iter().filter(|document| document.is_dirty()) {
            if document.save()? {
                saved += 1;
            }
        }
        Ok(saved)
    }

    /// Saves dirty documents and forgets every open handle.
    ///
    /// Handles still held by callers stay usable but are no longer returned
    /// by `fetch`.
    pub fn close(&self) -> StoreResult<()> {
        self.save_all()?;
        self.lock_open().clear();
        Ok(())
    }

    fn lock_open(&self) -> MutexGuard<'_, HashMap<PathBuf, DocumentRef>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        let open = self.open.get_mut().unwrap_or_else(PoisonError::into_inner);
        for document in open.values().filter(|document| document.is_dirty()) {
            if let Err(err) = document.save() {
                warn!(
                    "event=document_save module=store status=error trigger=drop document={} error={}",
                    document.display_id(),
                    err
                );
            }
        }
        open.clear();
    }
}
