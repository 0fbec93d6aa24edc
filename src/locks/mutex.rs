/*!
 * Mutex
 *
 * Non-reentrant mutual exclusion over a 0/1 state. Locking again from the
 * owning thread is reported as `AlreadyHeld` rather than deadlocking.
 */

use super::Lock;
use crate::core::context::current_id;
use crate::core::errors::{SyncError, SyncResult};
use crate::synchronizer::{AcquirePolicy, Condition, SyncCore, Synchronizer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 0 = unlocked, 1 = locked
#[derive(Debug, Default)]
pub struct MutexPolicy;

impl AcquirePolicy for MutexPolicy {
    fn try_acquire_exclusive(&self, core: &SyncCore, _arg: i64) -> SyncResult<bool> {
        if core.compare_and_set_state(0, 1) {
            core.set_exclusive_owner(Some(current_id()));
            return Ok(true);
        }
        Ok(false)
    }

    fn try_release_exclusive(&self, core: &SyncCore, _arg: i64) -> SyncResult<bool> {
        if core.state() == 0 {
            return Err(SyncError::IllegalMonitorState("unlock of an unlocked mutex"));
        }
        if !core.is_owned_by_current_thread() {
            return Err(SyncError::IllegalMonitorState("mutex is held by another thread"));
        }
        core.set_exclusive_owner(None);
        core.set_state(0);
        Ok(true)
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> bool {
        core.state() == 1 && core.is_owned_by_current_thread()
    }
}

/// Non-reentrant mutex
///
/// # Examples
///
/// ```
/// use queue_sync::locks::{Lock, Mutex};
///
/// let mutex = Mutex::new();
/// {
///     let _guard = mutex.guard().unwrap();
///     assert!(mutex.is_locked());
/// }
/// assert!(!mutex.is_locked());
/// ```
#[derive(Clone)]
pub struct Mutex {
    sync: Arc<Synchronizer<MutexPolicy>>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            sync: Arc::new(Synchronizer::new(0, MutexPolicy)),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.sync.state() != 0
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.sync.is_held_exclusively()
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<MutexPolicy>> {
        &self.sync
    }

    fn check_not_held(&self) -> SyncResult<()> {
        if self.is_held_by_current_thread() {
            return Err(SyncError::AlreadyHeld);
        }
        Ok(())
    }
}

impl Lock for Mutex {
    type Policy = MutexPolicy;

    fn lock(&self) -> SyncResult<()> {
        self.check_not_held()?;
        self.sync.acquire(1)
    }

    fn lock_interruptibly(&self) -> SyncResult<()> {
        self.check_not_held()?;
        self.sync.acquire_interruptibly(1)
    }

    fn try_lock(&self) -> SyncResult<bool> {
        self.sync.try_acquire(1)
    }

    fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.check_not_held()?;
        self.sync.try_acquire_for(1, timeout)
    }

    fn unlock(&self) -> SyncResult<()> {
        self.sync.release(1).map(|_| ())
    }

    fn new_condition(&self) -> SyncResult<Condition<MutexPolicy>> {
        Ok(self.sync.new_condition())
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mutex[{}]", if self.is_locked() { "locked" } else { "unlocked" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock() {
        let m = Mutex::new();
        m.lock().unwrap();
        assert!(m.is_locked());
        assert!(m.is_held_by_current_thread());
        m.unlock().unwrap();
        assert!(!m.is_locked());
    }

    #[test]
    fn test_relock_by_owner_is_rejected() {
        let m = Mutex::new();
        m.lock().unwrap();
        assert_eq!(m.lock(), Err(SyncError::AlreadyHeld));
        assert_eq!(m.try_lock(), Ok(false));
        m.unlock().unwrap();
    }

    #[test]
    fn test_unlock_without_lock() {
        let m = Mutex::new();
        assert!(matches!(m.unlock(), Err(SyncError::IllegalMonitorState(_))));
    }

    #[test]
    fn test_unlock_by_non_owner() {
        let m = Mutex::new();
        m.lock().unwrap();
        let other = m.clone();
        let result = std::thread::spawn(move || other.unlock()).join().unwrap();
        assert!(matches!(result, Err(SyncError::IllegalMonitorState(_))));
        assert!(m.is_locked());
        m.unlock().unwrap();
    }

    #[test]
    fn test_guard_debug_and_drop() {
        let m = Mutex::new();
        let guard = m.guard().unwrap();
        assert_eq!(format!("{:?}", m), "Mutex[locked]");
        guard.unlock().unwrap();
        assert_eq!(format!("{:?}", m), "Mutex[unlocked]");
    }
}
