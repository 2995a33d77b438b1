//! Git-backed filesystem.
//!
//! `GitStoreFs` exposes a [`GitStore`] session through the async
//! [`Filesystem`] trait. Store operations block on disk and network I/O,
//! so each one runs on tokio's blocking pool.

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::traits::{DirEntry, Filesystem};
use crate::error::{StoreError, StoreResult};
use crate::store::{GitStore, SEPARATOR};

/// Filesystem view of a store session.
#[derive(Debug, Clone)]
pub struct GitStoreFs {
    store: Arc<GitStore>,
}

impl GitStoreFs {
    pub fn new(store: Arc<GitStore>) -> Self {
        Self { store }
    }

    /// The underlying session, for closing it when done.
    pub fn store(&self) -> &Arc<GitStore> {
        &self.store
    }

    async fn blocking<T, F>(&self, path: &Path, f: F) -> io::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&GitStore, &str) -> StoreResult<T> + Send + 'static,
    {
        let name = resource_name(path)?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store, &name).map_err(into_io))
            .await
            .map_err(io::Error::other)?
    }
}

#[async_trait]
impl Filesystem for GitStoreFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.blocking(path, |store, name| store.read_to_vec(name)).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let data = data.to_vec();
        self.blocking(path, move |store, name| store.write_bytes(name, &data))
            .await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.blocking(path, |store, name| {
            let dir = store.local_path(name)?;
            let names = store.list(name)?;
            names
                .into_iter()
                .map(|entry| {
                    let bare = entry.trim_end_matches(SEPARATOR);
                    describe(bare, &dir.join(bare))
                })
                .collect()
        })
        .await
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        self.blocking(path, |store, name| {
            let (location, local) = store.locate(name)?;
            // The repository root has no name of its own.
            let entry_name = location.in_repo_path().rsplit('/').next().unwrap_or("");
            describe(entry_name, &local)
        })
        .await
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        self.blocking(path, |store, name| store.exists(name)).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.blocking(path, |store, name| {
            let local = store.local_path(name)?;
            fs::create_dir_all(&local).map_err(|e| StoreError::transfer(local, e))
        })
        .await
    }

    fn read_only(&self) -> bool {
        false
    }

    /// Maps through the session, so this clones the repository on first use.
    fn real_path(&self, path: &Path) -> Option<PathBuf> {
        let name = resource_name(path).ok()?;
        self.store.local_path(&name).ok()
    }
}

fn describe(name: &str, local: &Path) -> StoreResult<DirEntry> {
    let meta = fs::metadata(local).map_err(|e| StoreError::from_io(local, e))?;
    let mut entry = if meta.is_dir() {
        DirEntry::directory(name)
    } else {
        DirEntry::file(name, meta.len())
    };
    entry.modified = meta.modified().ok();
    Ok(entry)
}

/// Convert a VFS path into a resource name relative to the session base.
///
/// A leading `/` means the base itself; `..` is passed through so sibling
/// repositories stay reachable. A trailing `/` is kept, since it asks for a
/// directory.
fn resource_name(path: &Path) -> io::Result<String> {
    let mut segments: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("non-UTF-8 path: {}", path.display()),
                    )
                })?;
                segments.push(part.to_string());
            }
            Component::ParentDir => segments.push("..".to_string()),
            Component::CurDir | Component::RootDir => {}
            Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported path prefix: {}", path.display()),
                ));
            }
        }
    }
    let mut name = segments.join("/");
    let trailing = path
        .as_os_str()
        .to_str()
        .is_some_and(|raw| raw.ends_with(SEPARATOR));
    if trailing && !name.is_empty() {
        name.push(SEPARATOR);
    }
    Ok(name)
}

fn into_io(err: StoreError) -> io::Error {
    let kind = match &err {
        StoreError::NotFound { .. } => io::ErrorKind::NotFound,
        StoreError::AccessDenied { .. } => io::ErrorKind::PermissionDenied,
        StoreError::Resolution(_) => io::ErrorKind::InvalidInput,
        StoreError::TransferFailed { source, .. } => source.kind(),
        StoreError::RepositoryUnavailable { .. } | StoreError::Finalize(_) => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}
