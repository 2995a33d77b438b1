//! Test utilities for gitstore.
//!
//! Provides bare "remote" repositories on the local filesystem, so store
//! sessions can clone from and push to them without a network:
//!
//! ```text
//! RemoteHost (temp dir)
//! ├── site.git/      # Remote: bare repository
//! └── assets.git/    # Remote: sibling, reachable via ../assets.git
//! ```

#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use git2::{IndexEntry, IndexTime, Oid, Repository, Signature};
use tempfile::TempDir;

const TEST_AUTHOR: (&str, &str) = ("Fixture", "fixture@example.com");

/// A temporary directory holding sibling bare repositories.
pub struct RemoteHost {
    root: TempDir,
}

impl RemoteHost {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("failed to create remote host dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Create an empty bare repository named `name` (e.g. `site.git`).
    pub fn create(&self, name: &str) -> Remote {
        let path = self.root.path().join(name);
        let repo = Repository::init_bare(&path).expect("failed to init bare repository");
        repo.set_head("refs/heads/master")
            .expect("failed to point HEAD at master");
        Remote { path }
    }

    /// Locator for `name` on this host: `git:<dir>/<name>[#branch][/path]`.
    pub fn locator(&self, name: &str, branch: Option<&str>, path: &str) -> String {
        let mut locator = format!("git:{}", self.root.path().join(name).display());
        if let Some(branch) = branch {
            locator.push('#');
            locator.push_str(branch);
        }
        if !path.is_empty() {
            locator.push('/');
            locator.push_str(path.trim_start_matches('/'));
        }
        locator
    }
}

impl Default for RemoteHost {
    fn default() -> Self {
        Self::new()
    }
}

/// A bare repository standing in for a remote.
#[derive(Debug, Clone)]
pub struct Remote {
    path: PathBuf,
}

impl Remote {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Address a working copy would clone from.
    pub fn address(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> Repository {
        Repository::open_bare(&self.path).expect("failed to open bare repository")
    }

    /// Commit `files` on top of `branch` (creating it if needed).
    ///
    /// Files not listed keep their content from the parent commit.
    pub fn commit_files(&self, branch: &str, files: &[(&str, &str)], message: &str) -> Oid {
        let repo = self.open();
        let refname = format!("refs/heads/{branch}");
        let parent = repo
            .find_reference(&refname)
            .ok()
            .map(|r| r.peel_to_commit().expect("branch does not point at a commit"));

        let mut index = git2::Index::new().expect("failed to create in-memory index");
        if let Some(parent) = &parent {
            let tree = parent.tree().expect("parent has no tree");
            index.read_tree(&tree).expect("failed to read parent tree");
        }

        for (path, content) in files {
            let blob = repo.blob(content.as_bytes()).expect("failed to write blob");
            let entry = IndexEntry {
                ctime: IndexTime::new(0, 0),
                mtime: IndexTime::new(0, 0),
                dev: 0,
                ino: 0,
                mode: 0o100644,
                uid: 0,
                gid: 0,
                file_size: content.len() as u32,
                id: blob,
                flags: 0,
                flags_extended: 0,
                path: path.as_bytes().to_vec(),
            };
            index.add(&entry).expect("failed to stage fixture file");
        }

        let tree_id = index.write_tree_to(&repo).expect("failed to write tree");
        let tree = repo.find_tree(tree_id).expect("tree vanished");
        let sig = Signature::now(TEST_AUTHOR.0, TEST_AUTHOR.1).expect("bad signature");
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents)
            .expect("failed to commit fixture")
    }

    /// Content of `path` at the tip of `branch`, or `None` if absent.
    pub fn read_file(&self, branch: &str, path: &str) -> Option<String> {
        let repo = self.open();
        let commit = repo
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()?
            .peel_to_commit()
            .ok()?;
        let tree = commit.tree().ok()?;
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).ok()?;
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    /// Tip commit of `branch`, if the branch exists.
    pub fn branch_head(&self, branch: &str) -> Option<Oid> {
        self.open()
            .find_reference(&format!("refs/heads/{branch}"))
            .ok()?
            .target()
    }

    /// Number of commits reachable from `branch`.
    pub fn commit_count(&self, branch: &str) -> usize {
        let Some(head) = self.branch_head(branch) else {
            return 0;
        };
        let repo = self.open();
        let mut walk = repo.revwalk().expect("failed to start revwalk");
        walk.push(head).expect("failed to push branch head");
        walk.count()
    }

    /// Message of the tip commit of `branch`.
    pub fn head_message(&self, branch: &str) -> Option<String> {
        let repo = self.open();
        let commit = repo.find_commit(self.branch_head(branch)?).ok()?;
        commit.message().map(String::from)
    }
}
