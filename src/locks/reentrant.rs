/*!
 * Reentrant Mutex
 *
 * State is the owner's hold count. Fair mode never barges past queued
 * threads; non-fair mode (the default) lets an arriving thread take a free
 * lock immediately.
 */

use super::Lock;
use crate::core::context::{current_id, ContextId, ThreadHandle};
use crate::core::errors::{SyncError, SyncResult};
use crate::synchronizer::{AcquirePolicy, Condition, SyncCore, Synchronizer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ReentrantPolicy {
    fair: bool,
}

impl ReentrantPolicy {
    pub fn new(fair: bool) -> Self {
        Self { fair }
    }

    pub fn is_fair(&self) -> bool {
        self.fair
    }
}

impl AcquirePolicy for ReentrantPolicy {
    fn try_acquire_exclusive(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        let me = current_id();
        let c = core.state();
        if c == 0 {
            if self.fair && core.has_queued_predecessors() {
                return Ok(false);
            }
            if core.compare_and_set_state(0, arg) {
                core.set_exclusive_owner(Some(me));
                return Ok(true);
            }
        } else if core.exclusive_owner() == Some(me) {
            let next = c
                .checked_add(arg)
                .ok_or(SyncError::IllegalState("maximum lock count exceeded"))?;
            core.set_state(next);
            return Ok(true);
        }
        Ok(false)
    }

    fn try_release_exclusive(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        if !core.is_owned_by_current_thread() {
            return Err(SyncError::IllegalMonitorState(
                "unlock by a thread that does not hold the lock",
            ));
        }
        let c = core.state() - arg;
        if c < 0 {
            return Err(SyncError::IllegalMonitorState("released more holds than acquired"));
        }
        let free = c == 0;
        if free {
            core.set_exclusive_owner(None);
        }
        core.set_state(c);
        Ok(free)
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> bool {
        core.is_owned_by_current_thread()
    }
}

/// Owner-counted mutex
#[derive(Clone)]
pub struct ReentrantMutex {
    sync: Arc<Synchronizer<ReentrantPolicy>>,
}

impl Default for ReentrantMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrantMutex {
    /// Non-fair reentrant mutex
    pub fn new() -> Self {
        Self::with_fairness(false)
    }

    pub fn with_fairness(fair: bool) -> Self {
        Self {
            sync: Arc::new(Synchronizer::new(0, ReentrantPolicy::new(fair))),
        }
    }

    pub fn is_fair(&self) -> bool {
        self.sync.policy().is_fair()
    }

    /// Holds by the calling thread, 0 if it is not the owner
    pub fn hold_count(&self) -> i64 {
        if self.sync.is_held_exclusively() {
            self.sync.state()
        } else {
            0
        }
    }

    pub fn is_locked(&self) -> bool {
        self.sync.state() != 0
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.sync.is_held_exclusively()
    }

    pub fn owner(&self) -> Option<ContextId> {
        self.sync.core().exclusive_owner()
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn has_queued_thread(&self, thread: &ThreadHandle) -> bool {
        self.sync.is_queued(thread)
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }

    pub fn queued_threads(&self) -> Vec<ThreadHandle> {
        self.sync.queued_threads()
    }

    pub fn has_waiters(&self, condition: &Condition<ReentrantPolicy>) -> SyncResult<bool> {
        self.sync.has_waiters(condition)
    }

    pub fn wait_queue_length(&self, condition: &Condition<ReentrantPolicy>) -> SyncResult<usize> {
        self.sync.wait_queue_length(condition)
    }

    pub fn waiting_threads(&self, condition: &Condition<ReentrantPolicy>) -> SyncResult<Vec<ThreadHandle>> {
        self.sync.waiting_threads(condition)
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<ReentrantPolicy>> {
        &self.sync
    }
}

impl Lock for ReentrantMutex {
    type Policy = ReentrantPolicy;

    fn lock(&self) -> SyncResult<()> {
        self.sync.acquire(1)
    }

    fn lock_interruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_interruptibly(1)
    }

    /// Barges even in fair mode
    fn try_lock(&self) -> SyncResult<bool> {
        let core = self.sync.core();
        let me = current_id();
        let c = core.state();
        if c == 0 {
            if core.compare_and_set_state(0, 1) {
                core.set_exclusive_owner(Some(me));
                return Ok(true);
            }
        } else if core.exclusive_owner() == Some(me) {
            let next = c
                .checked_add(1)
                .ok_or(SyncError::IllegalState("maximum lock count exceeded"))?;
            core.set_state(next);
            return Ok(true);
        }
        Ok(false)
    }

    fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_for(1, timeout)
    }

    fn unlock(&self) -> SyncResult<()> {
        self.sync.release(1).map(|_| ())
    }

    fn new_condition(&self) -> SyncResult<Condition<ReentrantPolicy>> {
        Ok(self.sync.new_condition())
    }
}

impl fmt::Debug for ReentrantMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner() {
            Some(owner) => write!(f, "ReentrantMutex[locked by {}]", owner),
            None => write!(f, "ReentrantMutex[unlocked]"),
        }
    }
}
