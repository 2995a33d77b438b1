//! Session close: stage, commit, push, and dispose every working copy.

use crate::cache::{WorkingCopy, WorkingCopyCache};
use crate::config::{Credentials, StoreConfig};
use crate::error::{FinalizeError, FinalizeStage, GitError, RepositoryFailure};
use crate::transport::Transport;

/// Finalize every working copy in the cache.
///
/// Repositories are processed independently: a failure in one is recorded
/// and the rest still run. Working copies that finalize cleanly are deleted;
/// failing ones are kept on disk and reported in the returned error. An
/// empty cache is a no-op, so closing twice is harmless.
pub fn finalize(
    cache: &WorkingCopyCache,
    transport: &dyn Transport,
    credentials: &Credentials,
    config: &StoreConfig,
) -> Result<(), FinalizeError> {
    let mut failures = Vec::new();

    for copy in cache.drain() {
        match finalize_one(&copy, transport, credentials, config) {
            Ok(()) => {
                let dir = copy.local_directory().to_path_buf();
                if let Err(error) = copy.dispose() {
                    tracing::warn!(
                        address = copy.address(),
                        dir = %dir.display(),
                        %error,
                        "failed to delete working copy"
                    );
                }
            }
            Err((stage, source)) => {
                let retained = copy.retain();
                tracing::warn!(
                    address = copy.address(),
                    %stage,
                    error = %source,
                    retained = ?retained,
                    "failed to finalize working copy, keeping it on disk"
                );
                failures.push(RepositoryFailure {
                    address: copy.address().to_string(),
                    stage,
                    retained,
                    source,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(FinalizeError { failures })
    }
}

fn finalize_one(
    copy: &WorkingCopy,
    transport: &dyn Transport,
    credentials: &Credentials,
    config: &StoreConfig,
) -> Result<(), (FinalizeStage, GitError)> {
    let address = copy.address();
    let branch = copy.branch();

    copy.stage_all()
        .map_err(|e| (FinalizeStage::Stage, GitError::from(e)))?;

    let commit = copy
        .commit_staged(&config.commit_message, config.author())
        .map_err(|e| (FinalizeStage::Commit, GitError::from(e)))?;

    let Some(oid) = commit else {
        tracing::info!(address, branch, "nothing to commit, skipping push");
        return Ok(());
    };
    tracing::info!(address, branch, commit = %oid, "committed changes");

    copy.push(transport, credentials)
        .map_err(|e| (FinalizeStage::Push, e))?;
    tracing::info!(address, branch, "pushed");

    Ok(())
}
