//! Async filesystem view of a store session.
//!
//! ```text
//! async host ──→ Filesystem ──→ GitStoreFs ──spawn_blocking──→ GitStore
//! ```
//!
//! Paths are resource names relative to the session's base locator, so a
//! host can mount a git-backed store wherever it mounts local directories.

mod store_fs;
mod traits;

pub use store_fs::GitStoreFs;
pub use traits::{DirEntry, DirEntryKind, Filesystem};
