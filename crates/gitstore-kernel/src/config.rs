//! Configuration for gitstore sessions.
//!
//! Configuration is loaded from `~/.config/gitstore/config.toml`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::locator::DEFAULT_BRANCH;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read config from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Session-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Branch used when a locator omits `#branch`.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Commit message used for every repository on close.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Commit author name. Falls back to the repository's `user.name`.
    #[serde(default)]
    pub author_name: Option<String>,

    /// Commit author email. Falls back to the repository's `user.email`.
    #[serde(default)]
    pub author_email: Option<String>,

    /// Directory working copies are cloned into (default: system temp dir).
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_commit_message() -> String {
    "Site deployed by gitstore".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            commit_message: default_commit_message(),
            author_name: None,
            author_email: None,
            work_dir: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("", "", "gitstore").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Directory under which working copies are created.
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Configured author, when both name and email are set.
    pub fn author(&self) -> Option<(&str, &str)> {
        match (&self.author_name, &self.author_email) {
            (Some(name), Some(email)) => Some((name.as_str(), email.as_str())),
            _ => None,
        }
    }
}

/// Credentials used uniformly for every clone and push in a session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: Some(username.into()),
            password,
        }
    }

    /// No explicit credentials; transports fall back to ssh-agent and
    /// credential helpers.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
