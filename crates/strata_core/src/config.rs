//! Engine configuration from the environment.
//!
//! # Responsibility
//! - Read repository root and logging settings from `STRATA_*` variables.
//! - Turn them into a `RepositoryLocator` and an initialized logger.
//!
//! # Invariants
//! - Blank variables count as unset.
//! - A configured repository root is always absolute.

use crate::locator::RepositoryLocator;
use crate::logging::{self, default_log_level, normalize_level, LoggingError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const REPOSITORY_VAR: &str = "STRATA_REPOSITORY";
pub const LOG_LEVEL_VAR: &str = "STRATA_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "STRATA_LOG_DIR";

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `STRATA_LOG_LEVEL` is not a supported level.
    InvalidLogLevel(String),
    /// `STRATA_REPOSITORY` is not an absolute path.
    RelativeRepository(PathBuf),
    /// Logger could not be started.
    Logging(LoggingError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLogLevel(level) => {
                write!(f, "{LOG_LEVEL_VAR} has unsupported value `{level}`")
            }
            Self::RelativeRepository(path) => write!(
                f,
                "{REPOSITORY_VAR} must be an absolute path, got `{}`",
                path.display()
            ),
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolved engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Initial repository root, if configured.
    pub repository: Option<PathBuf>,
    pub log_level: &'static str,
    /// Log directory. Logging stays off when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            repository: None,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Reads settings from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let repository = read(REPOSITORY_VAR).map(PathBuf::from);
        if let Some(path) = &repository {
            if !path.is_absolute() {
                return Err(ConfigError::RelativeRepository(path.clone()));
            }
        }

        let log_level = match read(LOG_LEVEL_VAR) {
            Some(level) => {
                normalize_level(&level).map_err(|_| ConfigError::InvalidLogLevel(level))?
            }
            None => default_log_level(),
        };

        Ok(Self {
            repository,
            log_level,
            log_dir: read(LOG_DIR_VAR).map(PathBuf::from),
        })
    }

    /// Overrides the repository root, keeping the absolute-path rule.
    pub fn with_repository(mut self, path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(ConfigError::RelativeRepository(path));
        }
        self.repository = Some(path);
        Ok(self)
    }

    /// New session locator, pointing at the configured root when there is one.
    pub fn locator(&self) -> RepositoryLocator {
        match &self.repository {
            Some(root) => RepositoryLocator::with_root(root),
            None => RepositoryLocator::new(),
        }
    }

    /// Starts file logging when a log directory is configured.
    ///
    /// Returns whether logging is active.
    pub fn init_logging(&self) -> ConfigResult<bool> {
        let Some(log_dir) = &self.log_dir else {
            return Ok(false);
        };
        logging::init_logging(self.log_level, log_dir).map_err(ConfigError::Logging)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, LOG_LEVEL_VAR, REPOSITORY_VAR};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.locator().is_set());
        assert_eq!(config.init_logging(), Ok(false));
    }

    #[test]
    fn repository_must_be_absolute() {
        let err = EngineConfig::from_lookup(lookup(&[(REPOSITORY_VAR, "relative/root")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::RelativeRepository(PathBuf::from("relative/root"))
        );
    }

    #[test]
    fn log_level_is_normalized_and_validated() {
        let config = EngineConfig::from_lookup(lookup(&[(LOG_LEVEL_VAR, " Warning ")])).unwrap();
        assert_eq!(config.log_level, "warn");

        let err = EngineConfig::from_lookup(lookup(&[(LOG_LEVEL_VAR, "loud")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidLogLevel("loud".to_string()));
    }

    #[test]
    fn locator_points_at_configured_root() {
        let root = std::env::temp_dir();
        let config = EngineConfig::default().with_repository(&root).unwrap();
        assert_eq!(config.locator().get().unwrap(), root);
    }
}
