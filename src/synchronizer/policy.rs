/*!
 * Acquire Policy
 *
 * The seam between the synchronizer and the locks built on it. A policy
 * decides what the state word means; the synchronizer decides who waits.
 */

use super::queue::WaitQueue;
use super::state::AtomicState;
use crate::core::context::{current_id, ContextId};
use crate::core::errors::{SyncError, SyncResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// State, owner and queue view handed to every policy hook
pub struct SyncCore {
    state: AtomicState,
    owner: AtomicU64,
    pub(crate) queue: WaitQueue,
}

impl SyncCore {
    pub(crate) fn new(initial: i64) -> Self {
        Self {
            state: AtomicState::new(initial),
            owner: AtomicU64::new(0),
            queue: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> i64 {
        self.state.get()
    }

    #[inline]
    pub fn set_state(&self, new: i64) {
        self.state.set(new);
    }

    #[inline]
    pub fn compare_and_set_state(&self, expected: i64, new: i64) -> bool {
        self.state.compare_and_set(expected, new)
    }

    /// Thread recorded as exclusive owner, if any
    #[inline]
    pub fn exclusive_owner(&self) -> Option<ContextId> {
        ContextId::from_raw(self.owner.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn set_exclusive_owner(&self, owner: Option<ContextId>) {
        self.owner
            .store(owner.map_or(0, ContextId::as_u64), Ordering::SeqCst);
    }

    #[inline]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.exclusive_owner() == Some(current_id())
    }

    /// Whether a thread other than the caller is queued ahead of it
    pub fn has_queued_predecessors(&self) -> bool {
        self.queue.has_queued_predecessors(current_id())
    }

    pub fn has_queued_threads(&self) -> bool {
        self.queue.has_queued_threads()
    }

    /// Whether the first queued waiter is exclusive
    pub fn first_queued_is_exclusive(&self) -> bool {
        self.queue.first_queued_is_exclusive()
    }
}

/// Acquire/release hooks over the synchronizer state
///
/// Hooks must not block. Each default reports `Unsupported`, so a policy
/// implements only the modes it offers.
///
/// # Contract
///
/// - `try_release_exclusive` returns true iff the synchronizer is now fully released
/// - `try_acquire_shared` returns negative on failure, zero on success with
///   nothing left for others, positive on success when further shared
///   acquires may also succeed
/// - `try_release_shared` returns true iff waiting acquirers may now succeed
pub trait AcquirePolicy: Send + Sync {
    fn try_acquire_exclusive(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        let _ = (core, arg);
        Err(SyncError::Unsupported("exclusive acquire"))
    }

    fn try_release_exclusive(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        let _ = (core, arg);
        Err(SyncError::Unsupported("exclusive release"))
    }

    fn try_acquire_shared(&self, core: &SyncCore, arg: i64) -> SyncResult<i64> {
        let _ = (core, arg);
        Err(SyncError::Unsupported("shared acquire"))
    }

    fn try_release_shared(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        let _ = (core, arg);
        Err(SyncError::Unsupported("shared release"))
    }

    /// Whether the calling thread holds the synchronizer exclusively
    ///
    /// Required for conditions; the default reports false.
    fn is_held_exclusively(&self, core: &SyncCore) -> bool {
        let _ = core;
        false
    }
}
