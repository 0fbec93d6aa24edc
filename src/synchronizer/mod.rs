/*!
 * Queue Synchronizer
 *
 * Reusable blocking core for locks, semaphores and latches.
 *
 * # Architecture
 *
 * A `Synchronizer` owns one state word and one FIFO wait queue. The embedding
 * lock supplies an `AcquirePolicy` that interprets the state; the synchronizer
 * runs the fast path, queues and parks threads that fail it, and wakes the
 * head waiter when a release frees the state.
 *
 * - Exclusive and shared modes share the same queue
 * - Shared wakes propagate down runs of shared waiters
 * - Conditions (`Condition`) park threads on a secondary list and transfer
 *   them back into the main queue on signal
 *
 * # Ordering
 *
 * FIFO among queued waiters. A thread arriving on the fast path may barge
 * ahead of queued ones; fair policies opt out via `has_queued_predecessors`.
 */

mod arena;
mod condition;
mod policy;
mod queue;
mod queued;
mod state;
mod stats;

pub use arena::WaiterMode;
pub use condition::Condition;
pub use policy::{AcquirePolicy, SyncCore};
pub use queue::WaitQueue;
pub use state::AtomicState;
pub use stats::QueueStatsSnapshot;

use crate::core::context::{ContextId, ThreadHandle};
use crate::core::errors::{SyncError, SyncResult};
use queued::AcquireOutcome;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Policy host over one state word and one wait queue
pub struct Synchronizer<P: AcquirePolicy> {
    pub(crate) core: SyncCore,
    pub(crate) policy: P,
}

/// Serializable view of a synchronizer
#[derive(Debug, Clone, Serialize)]
pub struct SynchronizerSnapshot {
    pub state: i64,
    pub owner: Option<ContextId>,
    pub contended: bool,
    pub queue_length: usize,
    pub queued: Vec<ContextId>,
    pub stats: QueueStatsSnapshot,
}

#[inline]
fn deadline_after(timeout: Duration) -> Option<Instant> {
    // Saturate far-future deadlines to "no deadline"
    Instant::now().checked_add(timeout)
}

impl<P: AcquirePolicy> Synchronizer<P> {
    pub fn new(initial: i64, policy: P) -> Self {
        Self {
            core: SyncCore::new(initial),
            policy,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn core(&self) -> &SyncCore {
        &self.core
    }

    #[inline]
    pub fn state(&self) -> i64 {
        self.core.state()
    }

    // =========================================================================
    // Exclusive mode
    // =========================================================================

    /// Acquire exclusively, ignoring interrupts
    pub fn acquire(&self, arg: i64) -> SyncResult<()> {
        if !self.policy.try_acquire_exclusive(&self.core, arg)? {
            self.acquire_queued(None, arg, WaiterMode::Exclusive, false, None)?;
        }
        Ok(())
    }

    /// Acquire exclusively; fails with `Interrupted` if the thread is interrupted
    pub fn acquire_interruptibly(&self, arg: i64) -> SyncResult<()> {
        let me = ThreadHandle::current();
        if me.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.policy.try_acquire_exclusive(&self.core, arg)? {
            return Ok(());
        }
        match self.acquire_queued(None, arg, WaiterMode::Exclusive, true, None)? {
            AcquireOutcome::Acquired => Ok(()),
            _ => Err(SyncError::Interrupted),
        }
    }

    /// Single non-blocking attempt, may barge
    pub fn try_acquire(&self, arg: i64) -> SyncResult<bool> {
        self.policy.try_acquire_exclusive(&self.core, arg)
    }

    /// Acquire exclusively within `timeout`; `Ok(false)` on expiry
    pub fn try_acquire_for(&self, arg: i64, timeout: Duration) -> SyncResult<bool> {
        match deadline_after(timeout) {
            Some(deadline) => self.try_acquire_until(arg, deadline),
            None => self.acquire_interruptibly(arg).map(|_| true),
        }
    }

    pub fn try_acquire_until(&self, arg: i64, deadline: Instant) -> SyncResult<bool> {
        let me = ThreadHandle::current();
        if me.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.policy.try_acquire_exclusive(&self.core, arg)? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        match self.acquire_queued(None, arg, WaiterMode::Exclusive, true, Some(deadline))? {
            AcquireOutcome::Acquired => Ok(true),
            AcquireOutcome::TimedOut => Ok(false),
            AcquireOutcome::Interrupted => Err(SyncError::Interrupted),
        }
    }

    /// Release exclusively; wakes the head waiter if the state was freed
    pub fn release(&self, arg: i64) -> SyncResult<bool> {
        if self.policy.try_release_exclusive(&self.core, arg)? {
            self.core.queue.dequeue_and_wake();
            return Ok(true);
        }
        Ok(false)
    }

    // =========================================================================
    // Shared mode
    // =========================================================================

    pub fn acquire_shared(&self, arg: i64) -> SyncResult<()> {
        if self.policy.try_acquire_shared(&self.core, arg)? < 0 {
            self.acquire_queued(None, arg, WaiterMode::Shared, false, None)?;
        }
        Ok(())
    }

    pub fn acquire_shared_interruptibly(&self, arg: i64) -> SyncResult<()> {
        let me = ThreadHandle::current();
        if me.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.policy.try_acquire_shared(&self.core, arg)? >= 0 {
            return Ok(());
        }
        match self.acquire_queued(None, arg, WaiterMode::Shared, true, None)? {
            AcquireOutcome::Acquired => Ok(()),
            _ => Err(SyncError::Interrupted),
        }
    }

    /// Single non-blocking shared attempt
    pub fn try_acquire_shared(&self, arg: i64) -> SyncResult<bool> {
        Ok(self.policy.try_acquire_shared(&self.core, arg)? >= 0)
    }

    pub fn try_acquire_shared_for(&self, arg: i64, timeout: Duration) -> SyncResult<bool> {
        match deadline_after(timeout) {
            Some(deadline) => self.try_acquire_shared_until(arg, deadline),
            None => self.acquire_shared_interruptibly(arg).map(|_| true),
        }
    }

    pub fn try_acquire_shared_until(&self, arg: i64, deadline: Instant) -> SyncResult<bool> {
        let me = ThreadHandle::current();
        if me.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.policy.try_acquire_shared(&self.core, arg)? >= 0 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        match self.acquire_queued(None, arg, WaiterMode::Shared, true, Some(deadline))? {
            AcquireOutcome::Acquired => Ok(true),
            AcquireOutcome::TimedOut => Ok(false),
            AcquireOutcome::Interrupted => Err(SyncError::Interrupted),
        }
    }

    /// Release in shared mode; wakes waiters when the hook reports success
    pub fn release_shared(&self, arg: i64) -> SyncResult<bool> {
        if self.policy.try_release_shared(&self.core, arg)? {
            self.core.queue.release_shared_signal();
            return Ok(true);
        }
        Ok(false)
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// New condition bound to this synchronizer
    pub fn new_condition(self: &Arc<Self>) -> Condition<P> {
        Condition::new(Arc::clone(self))
    }

    pub fn is_held_exclusively(&self) -> bool {
        self.policy.is_held_exclusively(&self.core)
    }

    /// Whether `condition` was created by this synchronizer
    pub fn owns(self: &Arc<Self>, condition: &Condition<P>) -> bool {
        condition.is_owned_by(self)
    }

    pub fn has_waiters(self: &Arc<Self>, condition: &Condition<P>) -> SyncResult<bool> {
        if !self.owns(condition) {
            return Err(SyncError::IllegalState("condition not owned by this synchronizer"));
        }
        condition.has_waiters()
    }

    pub fn wait_queue_length(self: &Arc<Self>, condition: &Condition<P>) -> SyncResult<usize> {
        if !self.owns(condition) {
            return Err(SyncError::IllegalState("condition not owned by this synchronizer"));
        }
        condition.wait_queue_length()
    }

    pub fn waiting_threads(self: &Arc<Self>, condition: &Condition<P>) -> SyncResult<Vec<ThreadHandle>> {
        if !self.owns(condition) {
            return Err(SyncError::IllegalState("condition not owned by this synchronizer"));
        }
        condition.waiting_threads()
    }

    // =========================================================================
    // Queue inspection
    // =========================================================================

    pub fn has_queued_threads(&self) -> bool {
        self.core.queue.has_queued_threads()
    }

    /// Whether any thread has ever had to queue
    pub fn has_contended(&self) -> bool {
        self.core.queue.has_contended()
    }

    pub fn first_queued_thread(&self) -> Option<ThreadHandle> {
        self.core.queue.first_queued_thread()
    }

    pub fn has_queued_predecessors(&self) -> bool {
        self.core.has_queued_predecessors()
    }

    pub fn is_queued(&self, thread: &ThreadHandle) -> bool {
        self.core.queue.is_queued(thread)
    }

    pub fn queue_length(&self) -> usize {
        self.core.queue.queue_length()
    }

    pub fn queued_threads(&self) -> Vec<ThreadHandle> {
        self.core.queue.queued_threads()
    }

    pub fn exclusive_queued_threads(&self) -> Vec<ThreadHandle> {
        self.core
            .queue
            .queued_threads_where(|mode| mode == WaiterMode::Exclusive)
    }

    pub fn shared_queued_threads(&self) -> Vec<ThreadHandle> {
        self.core
            .queue
            .queued_threads_where(|mode| mode == WaiterMode::Shared)
    }

    pub fn queue_stats(&self) -> QueueStatsSnapshot {
        self.core.queue.stats.snapshot()
    }

    pub fn snapshot(&self) -> SynchronizerSnapshot {
        let queued: Vec<ContextId> = self.queued_threads().iter().map(ThreadHandle::id).collect();
        SynchronizerSnapshot {
            state: self.state(),
            owner: self.core.exclusive_owner(),
            contended: self.has_contended(),
            queue_length: queued.len(),
            queued,
            stats: self.queue_stats(),
        }
    }
}

impl<P: AcquirePolicy> fmt::Display for Synchronizer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = if self.has_queued_threads() {
            "nonempty"
        } else {
            "empty"
        };
        write!(f, "Synchronizer[state = {}, {} queue]", self.state(), q)
    }
}

impl<P: AcquirePolicy> fmt::Debug for Synchronizer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("state", &self.state())
            .field("owner", &self.core.exclusive_owner())
            .field("queue_length", &self.queue_length())
            .finish()
    }
}
