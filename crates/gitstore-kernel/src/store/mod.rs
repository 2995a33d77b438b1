//! The store session.
//!
//! A [`GitStore`] is one connection: it is opened against a base locator,
//! serves file-store operations by mapping resource names into working
//! copies, and on [`GitStore::close`] commits and pushes everything the
//! session touched.
//!
//! ```text
//! read / write / list / exists / put_directory
//!     ↓
//! ResourceMapper ── Locator::resolve ──→ ResolvedLocation
//!     ↓
//! WorkingCopyCache::get ──→ WorkingCopy (clone on first use)
//!     ↓
//! local file
//! ```

mod finalize;
mod mapper;

pub use finalize::finalize;
pub use mapper::{ResourceMapper, ResourceReader, SEPARATOR};

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::WorkingCopyCache;
use crate::config::{Credentials, StoreConfig};
use crate::error::{FinalizeError, StoreError, StoreResult};
use crate::locator::{Locator, ResolvedLocation};
use crate::transport::{Git2Transport, Transport};

/// A file store backed by git repositories, for one session.
pub struct GitStore {
    base: Locator,
    credentials: Credentials,
    config: StoreConfig,
    transport: Arc<dyn Transport>,
    cache: WorkingCopyCache,
}

impl GitStore {
    /// Open a session against `target` using libgit2 for clone and push.
    ///
    /// Nothing is cloned until the first operation needs a repository.
    pub fn open(target: &str, credentials: Credentials, config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_transport(target, credentials, config, Arc::new(Git2Transport))
    }

    /// Open a session with an explicit transport.
    pub fn open_with_transport(
        target: &str,
        credentials: Credentials,
        config: StoreConfig,
        transport: Arc<dyn Transport>,
    ) -> StoreResult<Self> {
        let base = Locator::parse_with_default_branch(target, &config.default_branch)?;
        let cache = WorkingCopyCache::new(Arc::clone(&transport), config.work_root());

        tracing::info!(
            address = %base.repository_address(),
            branch = base.branch(),
            path = %base.resource_path(),
            "opened session"
        );

        Ok(Self {
            base,
            credentials,
            config,
            transport,
            cache,
        })
    }

    /// The base locator resource names are resolved against.
    pub fn base(&self) -> &Locator {
        &self.base
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Working copies touched so far in this session.
    pub fn cache(&self) -> &WorkingCopyCache {
        &self.cache
    }

    fn mapper(&self) -> ResourceMapper<'_> {
        ResourceMapper::new(&self.base, &self.cache, &self.credentials)
    }

    /// Where a resource lands, with its local path.
    pub fn locate(&self, name: &str) -> StoreResult<(ResolvedLocation, PathBuf)> {
        self.mapper().map(name)
    }

    /// Local file path for a resource, cloning its repository if needed.
    pub fn local_path(&self, name: &str) -> StoreResult<PathBuf> {
        self.mapper().local_path(name)
    }

    /// Open a resource for reading.
    pub fn read(&self, name: &str) -> StoreResult<ResourceReader> {
        self.mapper().read(name)
    }

    /// Read a whole resource into memory.
    pub fn read_to_vec(&self, name: &str) -> StoreResult<Vec<u8>> {
        let mut reader = self.read(name)?;
        let mut data = Vec::with_capacity(usize::try_from(reader.content_length()).unwrap_or(0));
        reader
            .read_to_end(&mut data)
            .map_err(|e| StoreError::transfer(reader.path(), e))?;
        Ok(data)
    }

    /// Open a resource for writing. The returned file is the byte sink.
    pub fn write(&self, name: &str) -> StoreResult<File> {
        self.mapper().write(name)
    }

    /// Write `data` to a resource, replacing any existing content.
    pub fn write_bytes(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.local_path(name)?;
        let mut file = self.write(name)?;
        file.write_all(data)
            .and_then(|()| file.flush())
            .map_err(|e| StoreError::transfer(path, e))
    }

    /// List a directory; subdirectories end with `/`.
    pub fn list(&self, directory: &str) -> StoreResult<Vec<String>> {
        self.mapper().list(directory)
    }

    /// Does the resource exist? Names ending in `/` must be directories.
    pub fn exists(&self, name: &str) -> StoreResult<bool> {
        self.mapper().exists(name)
    }

    /// Copy a local directory tree into the store.
    pub fn put_directory(&self, source: &Path, destination: &str) -> StoreResult<()> {
        self.mapper().put_directory(source, destination)
    }

    /// Directory copy is always supported.
    pub fn supports_directory_copy(&self) -> bool {
        true
    }

    /// Commit, push, and delete every working copy touched in this session.
    ///
    /// All repositories are attempted; the error lists every one that
    /// failed. Closing an already-closed session does nothing.
    pub fn close(&self) -> Result<(), FinalizeError> {
        tracing::info!(repositories = self.cache.len(), "closing session");
        finalize(
            &self.cache,
            self.transport.as_ref(),
            &self.credentials,
            &self.config,
        )
    }
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("base", &self.base.to_string())
            .field("credentials", &self.credentials)
            .field("cache", &self.cache)
            .finish()
    }
}
