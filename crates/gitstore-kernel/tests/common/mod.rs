//! Shared setup for store integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use git2::Repository;
use gitstore_kernel::{
    Credentials, Git2Transport, GitError, GitStore, StoreConfig, Transport,
};
use gitstore_testutil::RemoteHost;
use tempfile::TempDir;

/// Remotes plus a private work root for one test.
pub struct Fixture {
    pub host: RemoteHost,
    pub work: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            host: RemoteHost::new(),
            work: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self) -> StoreConfig {
        StoreConfig {
            author_name: Some("Test Deployer".into()),
            author_email: Some("deployer@example.com".into()),
            work_dir: Some(self.work.path().to_path_buf()),
            ..StoreConfig::default()
        }
    }

    pub fn open(&self, locator: &str) -> GitStore {
        GitStore::open(locator, Credentials::anonymous(), self.config()).unwrap()
    }

    pub fn open_counting(&self, locator: &str) -> (GitStore, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport::default());
        let store = GitStore::open_with_transport(
            locator,
            Credentials::anonymous(),
            self.config(),
            Arc::clone(&transport) as Arc<dyn Transport>,
        )
        .unwrap();
        (store, transport)
    }

    /// Entries left in the work root.
    pub fn work_entries(&self) -> usize {
        std::fs::read_dir(self.work.path()).unwrap().count()
    }
}

/// Libgit2 transport that counts clones and pushes.
#[derive(Default)]
pub struct CountingTransport {
    inner: Git2Transport,
    pub clones: AtomicUsize,
    pub pushes: AtomicUsize,
}

impl CountingTransport {
    pub fn clones(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

impl Transport for CountingTransport {
    fn clone_repository(
        &self,
        address: &str,
        directory: &Path,
        credentials: &Credentials,
    ) -> Result<Repository, git2::Error> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        self.inner.clone_repository(address, directory, credentials)
    }

    fn push_branch(
        &self,
        repo: &Repository,
        branch: &str,
        credentials: &Credentials,
    ) -> Result<(), GitError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.inner.push_branch(repo, branch, credentials)
    }
}
