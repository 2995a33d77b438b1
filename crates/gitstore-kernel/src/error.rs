//! Error types for store operations.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::locator::ResolveError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed locator, or a resource name that climbs too far.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// Clone, fetch, or authentication failure.
    #[error("repository unavailable: {address}")]
    RepositoryUnavailable {
        address: String,
        #[source]
        source: git2::Error,
    },

    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("access denied: {}", path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: Option<io::Error>,
    },

    #[error("transfer failed: {}", path.display())]
    TransferFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

impl StoreError {
    /// Classify an I/O failure on a local path.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { path },
            io::ErrorKind::PermissionDenied => StoreError::AccessDenied {
                path,
                source: Some(err),
            },
            _ => StoreError::TransferFailed { path, source: err },
        }
    }

    /// Failure to transfer bytes, whatever the underlying I/O kind.
    pub(crate) fn transfer(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::TransferFailed {
            path: path.into(),
            source,
        }
    }
}

/// A git operation failure, or a push the remote refused.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("remote rejected {reference}: {message}")]
    Rejected { reference: String, message: String },

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// The step of session finalization that failed for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    Stage,
    Commit,
    Push,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizeStage::Stage => "stage",
            FinalizeStage::Commit => "commit",
            FinalizeStage::Push => "push",
        };
        f.write_str(name)
    }
}

/// One repository that could not be finalized.
#[derive(Debug, Error)]
#[error("{address}: {stage} failed: {source}")]
pub struct RepositoryFailure {
    /// Repository address of the failing working copy.
    pub address: String,
    /// Which step failed.
    pub stage: FinalizeStage,
    /// Local directory kept on disk so unpushed work can be recovered.
    pub retained: Option<PathBuf>,
    #[source]
    pub source: GitError,
}

/// Every repository that failed during session close.
#[derive(Debug, Error)]
#[error("failed to finalize {}", summarize(.failures))]
pub struct FinalizeError {
    pub failures: Vec<RepositoryFailure>,
}

impl FinalizeError {
    /// Addresses of the failing repositories.
    pub fn addresses(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.address.as_str()).collect()
    }
}

fn summarize(failures: &[RepositoryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
