/*!
 * Condition Queue
 *
 * Wait/signal on top of an exclusively held synchronizer.
 *
 * # Protocol
 *
 * A waiter is appended with `InConditionQueue | ReadyToWake`, fully releases
 * the synchronizer and parks. Whoever clears `InConditionQueue` first decides
 * the waiter's fate:
 * - a signaller that clears it transfers the waiter into the wait queue,
 *   where it is woken by an ordinary release
 * - a waiter that clears it on timeout or interrupt has cancelled; its node
 *   stays behind as a tombstone and it re-acquires through a fresh waiter
 *
 * Either way the synchronizer is re-acquired with the saved state before
 * `wait` returns. The condition list itself is only touched while the
 * synchronizer is held exclusively.
 */

use super::arena::{WaitStatus, WaiterMode, WaiterRef, NIL};
use super::policy::AcquirePolicy;
use super::Synchronizer;
use crate::core::context::ThreadHandle;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::sync::ParkResult;
use crossbeam_epoch as epoch;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Condition bound to one synchronizer
pub struct Condition<P: AcquirePolicy> {
    sync: Arc<Synchronizer<P>>,
    first: AtomicU64,
    last: AtomicU64,
}

/// How the condition wait loop ended
enum WaitEnd {
    Signalled,
    Cancelled,
}

impl<P: AcquirePolicy> Condition<P> {
    pub(crate) fn new(sync: Arc<Synchronizer<P>>) -> Self {
        Self {
            sync,
            first: AtomicU64::new(NIL),
            last: AtomicU64::new(NIL),
        }
    }

    pub(crate) fn is_owned_by(&self, sync: &Arc<Synchronizer<P>>) -> bool {
        Arc::ptr_eq(&self.sync, sync)
    }

    #[inline]
    fn first(&self) -> Option<WaiterRef> {
        WaiterRef::unpack(self.first.load(Ordering::SeqCst))
    }

    #[inline]
    fn last(&self) -> Option<WaiterRef> {
        WaiterRef::unpack(self.last.load(Ordering::SeqCst))
    }

    #[inline]
    fn set_first(&self, r: Option<WaiterRef>) {
        self.first.store(WaiterRef::pack_opt(r), Ordering::SeqCst);
    }

    #[inline]
    fn set_last(&self, r: Option<WaiterRef>) {
        self.last.store(WaiterRef::pack_opt(r), Ordering::SeqCst);
    }

    fn require_held(&self) -> SyncResult<()> {
        if self.sync.is_held_exclusively() {
            Ok(())
        } else {
            Err(SyncError::IllegalMonitorState(
                "condition used without holding the lock",
            ))
        }
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Wait until signalled or interrupted
    pub fn wait(&self) -> SyncResult<()> {
        self.wait_internal(true, None).map(|_| ())
    }

    /// Wait until signalled; interrupts are deferred until return
    pub fn wait_uninterruptibly(&self) -> SyncResult<()> {
        self.wait_internal(false, None).map(|_| ())
    }

    /// Wait at most `timeout`; `Ok(false)` if it elapsed first
    pub fn wait_for(&self, timeout: Duration) -> SyncResult<bool> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => self.wait().map(|_| true),
        }
    }

    /// Wait until `deadline`; `Ok(false)` if it passed first
    pub fn wait_until(&self, deadline: Instant) -> SyncResult<bool> {
        self.wait_internal(true, Some(deadline))
    }

    fn wait_internal(&self, interruptible: bool, deadline: Option<Instant>) -> SyncResult<bool> {
        let me = ThreadHandle::current();
        if interruptible && me.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.require_held()?;

        let (node, saved) = self.enable_wait(&me)?;
        let arena = &self.sync.core.queue.arena;
        let mut interrupted = false;
        let mut timed_out = false;

        let end = loop {
            if self.can_reacquire(node) {
                break WaitEnd::Signalled;
            }
            let interrupt_now = me.take_interrupted();
            interrupted |= interrupt_now;
            let expired = deadline.is_some_and(|d| Instant::now() >= d);

            if (interruptible && interrupted) || expired {
                if self.try_cancel(node) {
                    timed_out = expired && !interrupted;
                    break WaitEnd::Cancelled;
                }
                // Signalled concurrently; wait for the transfer to land
                std::thread::yield_now();
            } else if arena.status(node).contains(WaitStatus::IN_CONDITION_QUEUE) {
                if me.park(deadline) == ParkResult::TimedOut {
                    trace!(waiter = ?node, "condition wait deadline");
                }
            } else {
                std::thread::yield_now();
            }
        };

        let acquired = match end {
            WaitEnd::Signalled => {
                arena.set_status(node, WaitStatus::INITIAL);
                self.sync
                    .acquire_queued(Some(node), saved, WaiterMode::Exclusive, false, None)
            }
            WaitEnd::Cancelled => {
                debug!(waiter = ?node, timed_out, interrupted, "condition wait cancelled");
                self.sync
                    .acquire_queued(None, saved, WaiterMode::Exclusive, false, None)
            }
        };
        acquired?;

        match end {
            WaitEnd::Cancelled => {
                self.unlink_cancelled_waiters();
                if interrupted {
                    if interruptible {
                        return Err(SyncError::Interrupted);
                    }
                    me.restore_interrupt();
                }
                Ok(!timed_out)
            }
            WaitEnd::Signalled => {
                if interrupted {
                    me.restore_interrupt();
                }
                Ok(true)
            }
        }
    }

    /// Append a waiter for `me` and fully release, returning the saved state
    fn enable_wait(&self, me: &ThreadHandle) -> SyncResult<(WaiterRef, i64)> {
        let arena = &self.sync.core.queue.arena;
        let node = arena.allocate(
            WaiterMode::Exclusive,
            Some(me),
            WaitStatus::IN_CONDITION_QUEUE | WaitStatus::READY_TO_WAKE,
        )?;

        if let Some(last) = self.last() {
            if !arena.status(last).contains(WaitStatus::IN_CONDITION_QUEUE) {
                self.unlink_cancelled_waiters();
            }
        }
        match self.last() {
            Some(last) => arena.set_next_in_condition(last, Some(node)),
            None => self.set_first(Some(node)),
        }
        self.set_last(Some(node));

        let saved = self.sync.state();
        match self.sync.release(saved) {
            Ok(true) => Ok((node, saved)),
            Ok(false) | Err(_) => {
                // Leave a tombstone for the next unlink pass
                arena.set_status(node, WaitStatus::CANCELLED);
                arena.clear_thread(node);
                Err(SyncError::IllegalMonitorState(
                    "condition wait could not fully release the lock",
                ))
            }
        }
    }

    /// Whether the waiter has been transferred into the wait queue
    fn can_reacquire(&self, node: WaiterRef) -> bool {
        let queue = &self.sync.core.queue;
        let _guard = epoch::pin();
        match queue.arena.prev(node) {
            Some(p) => queue.arena.next(p) == Some(node) || queue.contains(node),
            None => false,
        }
    }

    /// Race a signaller for the waiter; true if the wait is now cancelled
    fn try_cancel(&self, node: WaiterRef) -> bool {
        let arena = &self.sync.core.queue.arena;
        let _guard = epoch::pin();
        let won = arena
            .fetch_unset(node, WaitStatus::IN_CONDITION_QUEUE)
            .contains(WaitStatus::IN_CONDITION_QUEUE);
        if won {
            arena.set_status(node, WaitStatus::CANCELLED);
            arena.clear_thread(node);
            self.sync.core.queue.stats.record_cancel();
        }
        won
    }

    /// Drop tombstones from the condition list; caller holds the lock
    fn unlink_cancelled_waiters(&self) {
        let arena = &self.sync.core.queue.arena;
        let guard = epoch::pin();
        let mut trail: Option<WaiterRef> = None;
        let mut cur = self.first();

        while let Some(w) = cur {
            let next = arena.next_in_condition(w);
            if arena.status(w).contains(WaitStatus::IN_CONDITION_QUEUE) {
                trail = Some(w);
            } else {
                match trail {
                    Some(t) => arena.set_next_in_condition(t, next),
                    None => self.set_first(next),
                }
                if next.is_none() {
                    self.set_last(trail);
                }
                arena.retire(w, &guard);
            }
            cur = next;
        }
    }

    // =========================================================================
    // Signalling
    // =========================================================================

    /// Move the longest-waiting thread to the wait queue
    pub fn signal(&self) -> SyncResult<()> {
        self.require_held()?;
        self.do_signal(false)
    }

    /// Move every waiting thread to the wait queue
    pub fn signal_all(&self) -> SyncResult<()> {
        self.require_held()?;
        self.do_signal(true)
    }

    fn do_signal(&self, all: bool) -> SyncResult<()> {
        let queue = &self.sync.core.queue;
        let arena = &queue.arena;
        let guard = epoch::pin();

        while let Some(w) = self.first() {
            let next = arena.next_in_condition(w);
            self.set_first(next);
            if next.is_none() {
                self.set_last(None);
            }
            arena.set_next_in_condition(w, None);

            let previous = arena.fetch_unset(w, WaitStatus::IN_CONDITION_QUEUE);
            if previous.contains(WaitStatus::IN_CONDITION_QUEUE) {
                queue.enqueue(w)?;
                queue.stats.record_transfer();
                trace!(waiter = ?w, "signal transferred waiter");
                if !all {
                    break;
                }
            } else {
                // Tombstone of a cancelled wait
                arena.retire(w, &guard);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Inspection (lock must be held)
    // =========================================================================

    fn for_each_waiter(&self, mut f: impl FnMut(WaiterRef)) {
        let arena = &self.sync.core.queue.arena;
        let _guard = epoch::pin();
        let mut cur = self.first();
        while let Some(w) = cur {
            if arena.status(w).contains(WaitStatus::IN_CONDITION_QUEUE) {
                f(w);
            }
            cur = arena.next_in_condition(w);
        }
    }

    pub fn has_waiters(&self) -> SyncResult<bool> {
        self.require_held()?;
        let mut any = false;
        self.for_each_waiter(|_| any = true);
        Ok(any)
    }

    pub fn wait_queue_length(&self) -> SyncResult<usize> {
        self.require_held()?;
        let mut n = 0;
        self.for_each_waiter(|_| n += 1);
        Ok(n)
    }

    pub fn waiting_threads(&self) -> SyncResult<Vec<ThreadHandle>> {
        self.require_held()?;
        let arena = &self.sync.core.queue.arena;
        let mut threads = Vec::new();
        self.for_each_waiter(|w| {
            if let Some(t) = arena.thread(w) {
                threads.push(ThreadHandle::from_inner(t));
            }
        });
        Ok(threads)
    }
}

impl<P: AcquirePolicy> fmt::Debug for Condition<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("first", &self.first())
            .field("last", &self.last())
            .finish()
    }
}

impl<P: AcquirePolicy> Drop for Condition<P> {
    fn drop(&mut self) {
        // No thread can be waiting here, so only tombstones remain
        let arena = &self.sync.core.queue.arena;
        let mut cur = self.first();
        while let Some(w) = cur {
            cur = arena.next_in_condition(w);
            arena.release(w);
        }
    }
}
