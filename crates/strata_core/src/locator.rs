//! Session-scoped repository root.
//!
//! # Responsibility
//! - Hold the base directory under which documents are resolved.
//! - Share that value with every clone of one locator, and nobody else.
//!
//! # Invariants
//! - There is no implicit default root; `get` fails until `set` is called.
//! - Changing the root never moves documents that already exist.
//! - Independently constructed locators never observe each other's root.

use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub type LocatorResult<T> = Result<T, LocatorError>;

/// Repository root lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// No root was set for this session, or it was unset.
    RepositoryNotSet,
}

impl Display for LocatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RepositoryNotSet => write!(
                f,
                "repository root is not set; set it before fetching or creating documents"
            ),
        }
    }
}

impl Error for LocatorError {}

/// Explicitly settable repository root for one logical session.
///
/// Clone the locator to hand the same session state to worker threads.
#[derive(Debug, Clone, Default)]
pub struct RepositoryLocator {
    root: Arc<RwLock<Option<PathBuf>>>,
}

impl RepositoryLocator {
    /// Creates an unset locator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a locator already pointing at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let locator = Self::new();
        locator.set(root);
        locator
    }

    /// Sets the root and returns the previous one.
    pub fn set(&self, root: impl Into<PathBuf>) -> Option<PathBuf> {
        let root = root.into();
        info!(
            "event=repository_set module=locator status=ok root={}",
            root.display()
        );
        let mut guard = self.root.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(root)
    }

    /// Returns the current root.
    pub fn get(&self) -> LocatorResult<PathBuf> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(LocatorError::RepositoryNotSet)
    }

    /// Clears the root and returns the previous one.
    pub fn unset(&self) -> Option<PathBuf> {
        info!("event=repository_unset module=locator status=ok");
        self.root
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_set(&self) -> bool {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Sets `root` until the returned guard is dropped, then restores the previous value.
    pub fn scoped(&self, root: impl AsRef<Path>) -> RepositoryScope {
        let previous = self.set(root.as_ref());
        RepositoryScope {
            locator: self.clone(),
            previous,
        }
    }
}

/// Restores the previous repository root on drop.
#[must_use = "the previous root is restored as soon as the scope is dropped"]
#[derive(Debug)]
pub struct RepositoryScope {
    locator: RepositoryLocator,
    previous: Option<PathBuf>,
}

impl Drop for RepositoryScope {
    fn drop(&mut self) {
        let mut guard = self
            .locator
            .root
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::{LocatorError, RepositoryLocator};
    use std::path::PathBuf;

    #[test]
    fn get_fails_until_set() {
        let locator = RepositoryLocator::new();
        assert_eq!(locator.get(), Err(LocatorError::RepositoryNotSet));

        locator.set("/tmp/repo");
        assert_eq!(locator.get(), Ok(PathBuf::from("/tmp/repo")));

        assert_eq!(locator.unset(), Some(PathBuf::from("/tmp/repo")));
        assert_eq!(locator.get(), Err(LocatorError::RepositoryNotSet));
    }

    #[test]
    fn clones_share_state_but_sessions_are_isolated() {
        let session = RepositoryLocator::new();
        let worker = session.clone();
        let other_session = RepositoryLocator::new();

        session.set("/tmp/shared");
        assert_eq!(worker.get(), Ok(PathBuf::from("/tmp/shared")));
        assert!(!other_session.is_set());
    }

    #[test]
    fn scope_restores_previous_root() {
        let locator = RepositoryLocator::with_root("/tmp/outer");
        {
            let _scope = locator.scoped("/tmp/inner");
            assert_eq!(locator.get(), Ok(PathBuf::from("/tmp/inner")));
        }
        assert_eq!(locator.get(), Ok(PathBuf::from("/tmp/outer")));

        let unset = RepositoryLocator::new();
        {
            let _scope = unset.scoped("/tmp/temporary");
            assert!(unset.is_set());
        }
        assert!(!unset.is_set());
    }
}
