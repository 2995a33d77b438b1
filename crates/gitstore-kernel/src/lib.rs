//! gitstore-kernel: a file store whose backing storage is git repositories.
//!
//! This crate provides:
//!
//! - **Locator**: Parses `git:<address>[#branch]/<path>` and resolves relative
//!   names, including `..` into sibling repositories
//! - **Cache**: One working copy per repository address, cloned on first use
//! - **Store**: The session object serving read, write, list, exists and
//!   directory copy against working copies
//! - **Finalize**: Stage, commit, push and clean up every repository on close
//! - **VFS**: An async `Filesystem` facade over a session
//!
//! ```no_run
//! use gitstore_kernel::{Credentials, GitStore, StoreConfig};
//!
//! let store = GitStore::open(
//!     "git:git@example.com:/org/site.git#gh-pages",
//!     Credentials::anonymous(),
//!     StoreConfig::default(),
//! )?;
//! store.write_bytes("index.html", b"<h1>hello</h1>")?;
//! store.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod locator;
pub mod store;
pub mod transport;
pub mod vfs;

pub use cache::{WorkingCopy, WorkingCopyCache};
pub use config::{ConfigError, Credentials, StoreConfig};
pub use error::{FinalizeError, FinalizeStage, GitError, RepositoryFailure, StoreError, StoreResult};
pub use locator::{DEFAULT_BRANCH, Locator, RepositoryAddress, ResolveError, ResolvedLocation};
pub use store::{GitStore, ResourceReader};
pub use transport::{Git2Transport, Transport};
pub use vfs::{DirEntry, DirEntryKind, Filesystem, GitStoreFs};
