//! Resource names → files inside working copies.
//!
//! Every store operation goes through [`ResourceMapper::map`]: resolve the
//! name against the base locator, fetch (or clone) the working copy for the
//! resolved repository, and join its directory with the in-repository path.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::cache::WorkingCopyCache;
use crate::config::Credentials;
use crate::error::{StoreError, StoreResult};
use crate::locator::{Locator, ResolvedLocation};

/// Directory entries suffixed with this are directories.
pub const SEPARATOR: char = '/';

/// Readable resource content with its length.
#[derive(Debug)]
pub struct ResourceReader {
    file: File,
    content_length: u64,
    path: PathBuf,
}

impl ResourceReader {
    /// Length in bytes, taken from file metadata when the resource was opened.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Local file backing the resource.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for ResourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Maps resource names onto working-copy files for one session.
pub struct ResourceMapper<'a> {
    base: &'a Locator,
    cache: &'a WorkingCopyCache,
    credentials: &'a Credentials,
}

impl<'a> ResourceMapper<'a> {
    pub fn new(base: &'a Locator, cache: &'a WorkingCopyCache, credentials: &'a Credentials) -> Self {
        Self {
            base,
            cache,
            credentials,
        }
    }

    /// Resolve `name` and return the location with its local path.
    ///
    /// Paths into the repository's own `.git` directory are refused.
    pub fn map(&self, name: &str) -> StoreResult<(ResolvedLocation, PathBuf)> {
        let resolved = self.base.resolve(name)?;
        if resolved.is_repository_metadata() {
            return Err(StoreError::AccessDenied {
                path: PathBuf::from(resolved.to_string()),
                source: None,
            });
        }

        let copy = self
            .cache
            .get(resolved.repository_address(), resolved.branch(), self.credentials)?;

        let path = if resolved.is_root() {
            copy.local_directory().to_path_buf()
        } else {
            copy.local_directory().join(resolved.in_repo_path())
        };
        tracing::debug!(name, location = %resolved, path = %path.display(), "mapped resource");
        Ok((resolved, path))
    }

    /// Local file path for `name`.
    pub fn local_path(&self, name: &str) -> StoreResult<PathBuf> {
        self.map(name).map(|(_, path)| path)
    }

    /// Open a resource for reading.
    pub fn read(&self, name: &str) -> StoreResult<ResourceReader> {
        let path = self.local_path(name)?;

        let metadata = fs::metadata(&path).map_err(|e| StoreError::from_io(&path, e))?;
        if metadata.is_dir() {
            return Err(StoreError::transfer(
                &path,
                io::Error::new(io::ErrorKind::IsADirectory, "resource is a directory"),
            ));
        }

        let file = File::open(&path).map_err(|e| StoreError::from_io(&path, e))?;
        Ok(ResourceReader {
            file,
            content_length: metadata.len(),
            path,
        })
    }

    /// Open a resource for writing, creating parent directories.
    ///
    /// Existing content is truncated.
    pub fn write(&self, name: &str) -> StoreResult<File> {
        let path = self.local_path(name)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::transfer(parent, e))?;
        }

        File::create(&path).map_err(|e| StoreError::transfer(&path, e))
    }

    /// List the immediate children of a directory, sorted.
    ///
    /// Directories carry exactly one trailing `/`. The `.git` directory at
    /// the repository root is hidden.
    pub fn list(&self, directory: &str) -> StoreResult<Vec<String>> {
        let (resolved, path) = self.map(directory)?;

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Err(StoreError::NotFound { path });
            }
            Err(e) => return Err(StoreError::from_io(path, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::transfer(&path, e))?;
            let mut name = entry.file_name().to_string_lossy().into_owned();

            if resolved.is_root() && name == ".git" {
                continue;
            }

            // Follow symlinks, so a link to a directory lists as a directory.
            let is_dir = fs::metadata(entry.path())
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if is_dir && !name.ends_with(SEPARATOR) {
                name.push(SEPARATOR);
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Does the resource exist?
    ///
    /// A name ending in `/` exists only as a directory.
    pub fn exists(&self, name: &str) -> StoreResult<bool> {
        let path = self.local_path(name)?;
        if name.ends_with(SEPARATOR) {
            Ok(path.is_dir())
        } else {
            Ok(path.exists())
        }
    }

    /// Copy a local directory tree into the store under `destination`.
    ///
    /// Nested `.git` directories in the source are skipped.
    pub fn put_directory(&self, source: &Path, destination: &str) -> StoreResult<()> {
        if !source.is_dir() {
            return Err(StoreError::NotFound {
                path: source.to_path_buf(),
            });
        }

        let target = self.local_path(destination)?;
        fs::create_dir_all(&target).map_err(|e| StoreError::transfer(&target, e))?;

        let walker = WalkDir::new(source)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");

        let mut copied = 0usize;
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                StoreError::transfer(path, e.into())
            })?;

            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| StoreError::transfer(entry.path(), io::Error::other(e)))?;
            let dest = target.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).map_err(|e| StoreError::transfer(&dest, e))?;
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| StoreError::transfer(parent, e))?;
                }
                fs::copy(entry.path(), &dest).map_err(|e| StoreError::transfer(&dest, e))?;
                copied += 1;
            }
        }

        tracing::debug!(
            source = %source.display(),
            destination,
            files = copied,
            "copied directory"
        );
        Ok(())
    }
}
