//! Advisory read-only flags per branch label

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{EvcError, EvcResult};
use crate::observability::{log_event_with_fields, Event};

/// Set of locked branch labels.
///
/// Only the service layer consults it; the store does not know about locks.
#[derive(Debug, Default)]
pub struct BranchLocks {
    locked: RwLock<BTreeSet<String>>,
}

impl BranchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locked<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locked: RwLock::new(branches.into_iter().map(Into::into).collect()),
        }
    }

    fn read(&self) -> EvcResult<RwLockReadGuard<'_, BTreeSet<String>>> {
        self.locked.read().map_err(|_| EvcError::poisoned())
    }

    fn write(&self) -> EvcResult<RwLockWriteGuard<'_, BTreeSet<String>>> {
        self.locked.write().map_err(|_| EvcError::poisoned())
    }

    /// Locks `branch`. Returns false if it was already locked.
    pub fn lock(&self, branch: &str) -> EvcResult<bool> {
        let added = self.write()?.insert(branch.to_string());
        if added {
            log_event_with_fields(Event::BranchLocked, &[("branch", branch)]);
        }
        Ok(added)
    }

    /// Unlocks `branch`. Returns false if it was not locked.
    pub fn unlock(&self, branch: &str) -> EvcResult<bool> {
        let removed = self.write()?.remove(branch);
        if removed {
            log_event_with_fields(Event::BranchUnlocked, &[("branch", branch)]);
        }
        Ok(removed)
    }

    /// Fails with `StorageUnavailable` if the lock set is poisoned.
    pub fn is_locked(&self, branch: &str) -> EvcResult<bool> {
        Ok(self.read()?.contains(branch))
    }

    /// Locked labels, sorted.
    pub fn locked(&self) -> EvcResult<Vec<String>> {
        Ok(self.read()?.iter().cloned().collect())
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.locked.write();
            panic!("poisoning branch locks");
        }));
    }
}
