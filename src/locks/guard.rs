/*!
 * RAII Lock Guard
 * Unlocks on drop; drop-time unlock failures are logged, never panicked
 */

use super::Lock;
use std::fmt;
use tracing::warn;

/// Holds a `Lock` until dropped
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, L: Lock + ?Sized> {
    lock: &'a L,
    released: bool,
}

impl<'a, L: Lock + ?Sized> LockGuard<'a, L> {
    pub(crate) fn new(lock: &'a L) -> Self {
        Self {
            lock,
            released: false,
        }
    }

    /// The lock this guard holds
    pub fn lock(&self) -> &'a L {
        self.lock
    }

    /// Unlock now, surfacing any error instead of logging it
    pub fn unlock(mut self) -> crate::core::errors::SyncResult<()> {
        self.released = true;
        self.lock.unlock()
    }
}

impl<L: Lock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.unlock() {
            warn!(error = %e, "unlock failed while dropping lock guard");
        }
    }
}

impl<L: Lock + ?Sized> fmt::Debug for LockGuard<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("released", &self.released)
            .finish()
    }
}
