//! Working-copy cache.
//!
//! Maps a canonical repository address to the single working copy cloned for
//! it during a session:
//!
//! ```text
//! slots: Mutex<HashMap<address, Arc<Slot>>>
//!                                   │
//!                                   └─ Slot = Mutex<Option<Arc<WorkingCopy>>>
//! ```
//!
//! The map lock is held only long enough to find or insert a slot. The clone
//! happens under the slot's own lock, so two callers racing on the same
//! address get one clone between them, while different addresses clone in
//! parallel. A failed clone leaves the slot empty and the next call retries.

mod working_copy;

pub use working_copy::WorkingCopy;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::Credentials;
use crate::error::{StoreError, StoreResult};
use crate::transport::Transport;

type Slot = Mutex<Option<Arc<WorkingCopy>>>;

/// Repository address → working copy, for one session.
pub struct WorkingCopyCache {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    transport: Arc<dyn Transport>,
    work_root: PathBuf,
}

impl WorkingCopyCache {
    /// Create an empty cache cloning through `transport` into `work_root`.
    pub fn new(transport: Arc<dyn Transport>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            transport,
            work_root: work_root.into(),
        }
    }

    /// Get the working copy for `address`, cloning it on first use.
    ///
    /// `branch` only matters for the first call per address; later calls get
    /// the existing working copy whatever branch they ask for.
    pub fn get(
        &self,
        address: &str,
        branch: &str,
        credentials: &Credentials,
    ) -> StoreResult<Arc<WorkingCopy>> {
        let slot = {
            let mut slots = self.slots.lock().map_err(|_| poisoned(address))?;
            Arc::clone(slots.entry(address.to_string()).or_default())
        };

        let mut entry = slot.lock().map_err(|_| poisoned(address))?;
        if let Some(copy) = entry.as_ref() {
            if copy.branch() != branch {
                tracing::debug!(
                    address,
                    requested = branch,
                    checked_out = copy.branch(),
                    "working copy already on another branch"
                );
            }
            return Ok(Arc::clone(copy));
        }

        let copy = Arc::new(WorkingCopy::materialize(
            address,
            branch,
            credentials,
            self.transport.as_ref(),
            &self.work_root,
        )?);
        *entry = Some(Arc::clone(&copy));
        Ok(copy)
    }

    /// Remove and return every materialized working copy, ordered by address.
    ///
    /// A caller cloning concurrently is waited for; its working copy is
    /// included.
    pub fn drain(&self) -> Vec<Arc<WorkingCopy>> {
        let slots = match self.slots.lock() {
            Ok(mut slots) => std::mem::take(&mut *slots),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let mut copies: Vec<Arc<WorkingCopy>> = slots
            .into_values()
            .filter_map(|slot| match slot.lock() {
                Ok(mut entry) => entry.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            })
            .collect();
        copies.sort_by(|a, b| a.address().cmp(b.address()));
        copies
    }

    /// Addresses with a materialized working copy, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let slots = match self.slots.lock() {
            Ok(slots) => slots.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut addresses: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().map(|entry| entry.is_some()).unwrap_or(false))
            .map(|(address, _)| address)
            .collect();
        addresses.sort();
        addresses
    }

    /// Number of materialized working copies.
    pub fn len(&self) -> usize {
        self.addresses().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for WorkingCopyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopyCache")
            .field("addresses", &self.addresses())
            .field("work_root", &self.work_root)
            .finish()
    }
}

fn poisoned(address: &str) -> StoreError {
    StoreError::RepositoryUnavailable {
        address: address.to_string(),
        source: git2::Error::from_str("working copy cache lock poisoned"),
    }
}
