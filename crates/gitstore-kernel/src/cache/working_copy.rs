//! A locally materialized clone of one repository.
//!
//! A `WorkingCopy` owns its clone directory and the open repository handle.
//! Git operations lock the handle, so a working copy can be shared between
//! threads behind an `Arc`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git2::build::CheckoutBuilder;
use git2::{BranchType, Commit, ErrorCode, IndexAddOption, Oid, Repository, Signature};
use tempfile::TempDir;

use crate::config::Credentials;
use crate::error::{GitError, StoreError, StoreResult};
use crate::transport::{ORIGIN, Transport};

/// Identity used when neither the configuration nor the repository has one.
const FALLBACK_AUTHOR: (&str, &str) = ("gitstore", "gitstore@localhost");

/// One cloned repository with its branch checked out.
pub struct WorkingCopy {
    address: String,
    branch: String,
    created_branch: bool,
    root: PathBuf,
    /// `None` once the working copy has been released.
    repo: Mutex<Option<Repository>>,
    /// Owns the directory; taken on dispose or retain.
    dir: Mutex<Option<TempDir>>,
}

impl WorkingCopy {
    /// Clone `address` into a fresh directory under `work_root` and check out
    /// `branch`, creating it as an unborn branch when the remote lacks it.
    pub fn materialize(
        address: &str,
        branch: &str,
        credentials: &Credentials,
        transport: &dyn Transport,
        work_root: &Path,
    ) -> StoreResult<Self> {
        fs::create_dir_all(work_root).map_err(|e| StoreError::transfer(work_root, e))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", directory_prefix(address)))
            .tempdir_in(work_root)
            .map_err(|e| StoreError::transfer(work_root, e))?;

        let unavailable = |source| StoreError::RepositoryUnavailable {
            address: address.to_string(),
            source,
        };

        tracing::info!(address, branch, dir = %dir.path().display(), "cloning repository");
        let repo = transport
            .clone_repository(address, dir.path(), credentials)
            .map_err(unavailable)?;
        let created_branch = check_out_branch(&repo, branch).map_err(unavailable)?;

        Ok(Self {
            address: address.to_string(),
            branch: branch.to_string(),
            created_branch,
            root: dir.path().to_path_buf(),
            repo: Mutex::new(Some(repo)),
            dir: Mutex::new(Some(dir)),
        })
    }

    /// Repository address this working copy was cloned from.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Branch checked out for this session.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// True when the branch did not exist on the remote and starts unborn.
    pub fn created_branch(&self) -> bool {
        self.created_branch
    }

    /// Root of the working tree.
    pub fn local_directory(&self) -> &Path {
        &self.root
    }

    fn with_repo<T, E>(&self, f: impl FnOnce(&Repository) -> Result<T, E>) -> Result<T, E>
    where
        E: From<git2::Error>,
    {
        let guard = self
            .repo
            .lock()
            .map_err(|_| git2::Error::from_str("failed to acquire repository lock"))?;
        let repo = guard
            .as_ref()
            .ok_or_else(|| git2::Error::from_str("working copy has been released"))?;
        f(repo)
    }

    /// Branch HEAD points at, born or not.
    pub fn head_branch(&self) -> Result<Option<String>, git2::Error> {
        self.with_repo(|repo| {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(String::from))
        })
    }

    /// Stage every addition, modification, and deletion in the working tree.
    pub fn stage_all(&self) -> Result<(), git2::Error> {
        self.with_repo(|repo| {
            let mut index = repo.index()?;
            index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"], None)?;
            index.write()?;
            Ok(())
        })
    }

    /// Commit the index on top of HEAD.
    ///
    /// Returns `None` without committing when the staged tree is identical
    /// to HEAD's tree (or the index is empty on an unborn branch).
    pub fn commit_staged(
        &self,
        message: &str,
        author: Option<(&str, &str)>,
    ) -> Result<Option<Oid>, git2::Error> {
        self.with_repo(|repo| {
            let mut index = repo.index()?;
            let tree_oid = index.write_tree()?;

            let parent = match repo.head() {
                Ok(head) => Some(head.peel_to_commit()?),
                Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                    None
                }
                Err(e) => return Err(e),
            };

            let unchanged = match &parent {
                Some(commit) => commit.tree_id() == tree_oid,
                None => index.is_empty(),
            };
            if unchanged {
                return Ok(None);
            }

            let signature = signature(repo, author)?;
            let tree = repo.find_tree(tree_oid)?;
            let parents: Vec<&Commit> = parent.iter().collect();
            let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
            Ok(Some(oid))
        })
    }

    /// Push the session branch to `origin`.
    pub fn push(&self, transport: &dyn Transport, credentials: &Credentials) -> Result<(), GitError> {
        self.with_repo(|repo| transport.push_branch(repo, &self.branch, credentials))
    }

    /// Release the repository handle and delete the working directory.
    pub fn dispose(&self) -> io::Result<()> {
        self.release_repo();
        let dir = match self.dir.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match dir {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }

    /// Release the repository handle but keep the directory on disk.
    ///
    /// Returns the kept path, or `None` if the directory was already gone.
    pub fn retain(&self) -> Option<PathBuf> {
        self.release_repo();
        let dir = match self.dir.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        dir.map(TempDir::keep)
    }

    fn release_repo(&self) {
        match self.repo.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }
}

impl std::fmt::Debug for WorkingCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("address", &self.address)
            .field("branch", &self.branch)
            .field("root", &self.root)
            .finish()
    }
}

/// Check out `branch` in a fresh clone.
///
/// Returns `true` when the remote has no such branch and HEAD was pointed at
/// a new unborn branch instead. The clone's default-branch files are removed
/// from the index and working tree in that case, so the new branch holds
/// only what the session writes.
fn check_out_branch(repo: &Repository, branch: &str) -> Result<bool, git2::Error> {
    let refname = format!("refs/heads/{branch}");

    if let Ok(head) = repo.head() {
        if head.is_branch() && head.name() == Some(refname.as_str()) {
            return Ok(false);
        }
    }

    let tracking = format!("{ORIGIN}/{branch}");
    match repo.find_branch(&tracking, BranchType::Remote) {
        Ok(remote_branch) => {
            let commit = remote_branch.get().peel_to_commit()?;
            let mut local = repo.branch(branch, &commit, false)?;
            local.set_upstream(Some(&tracking))?;
            // Check out against the old HEAD so its files are removed.
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
            repo.set_head(&refname)?;
            Ok(false)
        }
        Err(e) if e.code() == ErrorCode::NotFound => {
            tracing::info!(branch, "branch missing on remote, starting unborn branch");
            repo.set_head(&refname)?;
            clear_checkout(repo)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Empty the index and every working-tree entry except `.git`.
fn clear_checkout(repo: &Repository) -> Result<(), git2::Error> {
    let mut index = repo.index()?;
    index.clear()?;
    index.write()?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| git2::Error::from_str("repository has no working tree"))?;
    let io_err = |e: io::Error| git2::Error::from_str(&e.to_string());

    for entry in fs::read_dir(workdir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        if entry.file_type().map_err(io_err)?.is_dir() {
            fs::remove_dir_all(&path).map_err(io_err)?;
        } else {
            fs::remove_file(&path).map_err(io_err)?;
        }
    }
    Ok(())
}

/// Commit identity: configured author, then the repository's, then a fixed one.
fn signature(
    repo: &Repository,
    author: Option<(&str, &str)>,
) -> Result<Signature<'static>, git2::Error> {
    if let Some((name, email)) = author {
        return Signature::now(name, email);
    }
    match repo.signature() {
        Ok(sig) => Ok(sig.to_owned()),
        Err(_) => Signature::now(FALLBACK_AUTHOR.0, FALLBACK_AUTHOR.1),
    }
}

/// Filesystem-safe prefix for a working-copy directory.
fn directory_prefix(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .chars()
        .rev()
        .take(48)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}
