/*!
 * Wait Queue
 *
 * Intrusive FIFO of blocked threads, linked through arena slots.
 *
 * # Design
 *
 * The queue is a doubly-linked list with a dummy head:
 * - `prev` links are authoritative and written only by a waiter's owner
 *   (or by whoever enqueues it); `next` links are hints, so any traversal
 *   that finds a missing or cancelled `next` rescans backwards from the tail
 * - Enqueue is a single CAS on `tail`
 * - The node that acquires becomes the new dummy head
 *
 * # Reclamation
 *
 * A slot is retired only once nothing in the queue links to it:
 * - the old head is retired by the waiter that replaces it
 * - a cancelled waiter is retired by its unique successor when skipped,
 *   or by whoever swings `tail` back over it
 *
 * Every operation runs pinned; nobody parks while pinned.
 */

use super::arena::{WaitStatus, WaiterArena, WaiterMode, WaiterRef, NIL};
use super::stats::QueueStats;
use crate::core::context::{ContextId, ThreadHandle};
use crate::core::errors::SyncResult;
use crossbeam_epoch::{self as epoch, Guard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

pub struct WaitQueue {
    head: AtomicU64,
    tail: AtomicU64,
    pub(crate) arena: Arc<WaiterArena>,
    pub(crate) stats: QueueStats,
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            head: AtomicU64::new(NIL),
            tail: AtomicU64::new(NIL),
            arena: Arc::new(WaiterArena::new()),
            stats: QueueStats::default(),
        }
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<WaiterRef> {
        WaiterRef::unpack(self.head.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn tail(&self) -> Option<WaiterRef> {
        WaiterRef::unpack(self.tail.load(Ordering::SeqCst))
    }

    #[inline]
    fn cas_tail(&self, current: Option<WaiterRef>, new: Option<WaiterRef>) -> bool {
        self.tail
            .compare_exchange(
                WaiterRef::pack_opt(current),
                WaiterRef::pack_opt(new),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Install the dummy head on first contention
    fn initialize_head(&self) -> SyncResult<()> {
        loop {
            if self.tail().is_some() {
                return Ok(());
            }
            if self.head().is_some() {
                // Another thread is between installing head and tail
                std::hint::spin_loop();
                continue;
            }
            let dummy = self
                .arena
                .allocate(WaiterMode::Exclusive, None, WaitStatus::INITIAL)?;
            if self
                .head
                .compare_exchange(NIL, dummy.pack(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.tail.store(dummy.pack(), Ordering::SeqCst);
                return Ok(());
            }
            self.arena.release(dummy);
        }
    }

    /// Allocate an unlinked waiter for `thread`
    pub(crate) fn allocate(&self, mode: WaiterMode, thread: &ThreadHandle) -> SyncResult<WaiterRef> {
        self.arena.allocate(mode, Some(thread), WaitStatus::INITIAL)
    }

    /// Free a waiter that was never linked into the queue
    pub(crate) fn discard(&self, node: WaiterRef) {
        self.arena.release(node);
    }

    /// One enqueue attempt; on failure the waiter is left unlinked
    pub(crate) fn try_enqueue(&self, node: WaiterRef) -> SyncResult<bool> {
        let _guard = epoch::pin();
        let t = self.tail();
        self.arena.set_prev(node, t);
        let Some(t) = t else {
            self.initialize_head()?;
            self.arena.set_prev(node, None);
            return Ok(false);
        };
        if !self.cas_tail(Some(t), Some(node)) {
            self.arena.set_prev(node, None);
            return Ok(false);
        }
        self.arena.set_next(t, Some(node));
        self.stats.record_enqueue();
        trace!(waiter = ?node, "enqueued");
        Ok(true)
    }

    /// Link `node` at the tail, retrying until the CAS succeeds
    ///
    /// Used for waiters whose owner is not running the acquire loop, so a
    /// cancelled predecessor wakes the owner to clean up.
    pub(crate) fn enqueue(&self, node: WaiterRef) -> SyncResult<()> {
        let _guard = epoch::pin();
        loop {
            let t = self.tail();
            self.arena.set_prev(node, t);
            let Some(t) = t else {
                self.initialize_head()?;
                continue;
            };
            if self.cas_tail(Some(t), Some(node)) {
                self.arena.set_next(t, Some(node));
                self.stats.record_enqueue();
                trace!(waiter = ?node, "enqueued by transfer");
                if self.arena.status(t).is_cancelled() {
                    if let Some(thread) = self.arena.thread(node) {
                        thread.unpark();
                    }
                }
                return Ok(());
            }
        }
    }

    /// Make `node` the dummy head, retiring the previous head
    ///
    /// Returns the previous head's status. Only the unique successor of the
    /// head may call this, after winning acquisition.
    pub(crate) fn set_head(&self, node: WaiterRef, guard: &Guard) -> WaitStatus {
        let old = self.head();
        let old_status = old.map_or(WaitStatus::INITIAL, |h| self.arena.status(h));
        self.arena.clear_thread(node);
        self.arena.set_status(node, WaitStatus::INITIAL);
        self.head.store(node.pack(), Ordering::SeqCst);
        self.arena.set_prev(node, None);
        if let Some(old) = old {
            self.arena.retire(old, guard);
        }
        old_status
    }

    /// Unlink the cancelled predecessor `pred` of `node`
    ///
    /// A cancelled waiter's `prev` is final, and `node` is its only successor,
    /// so `node` may retire it.
    pub(crate) fn skip_cancelled(&self, node: WaiterRef, pred: WaiterRef, guard: &Guard) -> bool {
        let Some(pp) = self.arena.prev(pred) else {
            return false;
        };
        self.arena.set_prev(node, Some(pp));
        self.arena.set_next(pp, Some(node));
        self.arena.retire(pred, guard);
        true
    }

    /// Remove a waiter that gave up, handing any pending wake to its successor
    pub(crate) fn cancel(&self, node: WaiterRef) {
        let guard = epoch::pin();
        self.arena.clear_thread(node);
        self.stats.record_cancel();

        let Some(mut pred) = self.arena.prev(node) else {
            // Never linked
            self.arena.release(node);
            return;
        };
        while self.arena.status(pred).is_cancelled() {
            if !self.skip_cancelled(node, pred, &guard) {
                break;
            }
            match self.arena.prev(node) {
                Some(p) => pred = p,
                None => break,
            }
        }

        // From here on this waiter's prev link is final
        self.arena.set_status(node, WaitStatus::CANCELLED);
        trace!(waiter = ?node, "cancelled");

        if self.cas_tail(Some(node), Some(pred)) {
            self.arena.cas_next(pred, Some(node), None);
            self.arena.retire(node, &guard);
            self.reap_cancelled_tail(pred, &guard);
        } else {
            self.unpark_successor(node);
        }
    }

    /// Swing `tail` back over cancelled waiters at the end of the queue
    fn reap_cancelled_tail(&self, mut p: WaiterRef, guard: &Guard) {
        while self.arena.status(p).is_cancelled() {
            let Some(pp) = self.arena.prev(p) else {
                break;
            };
            if !self.cas_tail(Some(p), Some(pp)) {
                break;
            }
            self.arena.cas_next(pp, Some(p), None);
            self.arena.retire(p, guard);
            p = pp;
        }
    }

    /// Wake the first live waiter after `h`, if it is armed
    ///
    /// Returns the waiter that was unparked.
    pub(crate) fn unpark_successor(&self, h: WaiterRef) -> Option<WaiterRef> {
        self.wake_successor(h).map(|(s, _)| s)
    }

    fn wake_successor(&self, h: WaiterRef) -> Option<(WaiterRef, ThreadHandle)> {
        let _guard = epoch::pin();
        let mut s = self
            .arena
            .next(h)
            .filter(|&s| !self.arena.status(s).is_cancelled());

        if s.is_none() {
            // Forward link missing or stale: scan back from the tail
            let mut t = self.tail();
            while let Some(cur) = t {
                if cur == h {
                    break;
                }
                if !self.arena.status(cur).is_cancelled() {
                    s = Some(cur);
                }
                t = self.arena.prev(cur);
            }
        }

        let s = s?;
        let thread = self.arena.thread(s);
        if self
            .arena
            .fetch_unset(s, WaitStatus::READY_TO_WAKE)
            .contains(WaitStatus::READY_TO_WAKE)
        {
            if let Some(thread) = thread {
                self.stats.record_wake();
                thread.unpark();
                return Some((s, ThreadHandle::from_inner(thread)));
            }
        }
        None
    }

    /// Wake the first waiter after the head, returning the woken thread
    pub fn dequeue_and_wake(&self) -> Option<ThreadHandle> {
        self.head().and_then(|h| self.wake_successor(h)).map(|(_, t)| t)
    }

    /// Shared release: wake the successor or leave a propagate mark on the head
    ///
    /// Repeats while the head moves underneath, so a concurrent shared
    /// acquire cannot miss the release.
    pub(crate) fn release_shared_signal(&self) {
        loop {
            let h = self.head();
            if let Some(h) = h {
                if Some(h) != self.tail() && self.unpark_successor(h).is_none() {
                    self.arena
                        .cas_status(h, WaitStatus::INITIAL, WaitStatus::SHARED_PROPAGATE);
                }
            }
            if self.head() == h {
                break;
            }
        }
    }

    /// Whether `node` is reachable from the tail
    pub(crate) fn contains(&self, node: WaiterRef) -> bool {
        let _guard = epoch::pin();
        let mut t = self.tail();
        while let Some(cur) = t {
            if cur == node {
                return true;
            }
            t = self.arena.prev(cur);
        }
        false
    }

    // =========================================================================
    // Introspection (approximate under contention)
    // =========================================================================

    /// Visit queued threads from tail to head, excluding the dummy head
    fn for_each_queued(&self, mut f: impl FnMut(WaiterRef, Option<ThreadHandle>) -> bool) {
        let _guard = epoch::pin();
        let mut t = self.tail();
        while let Some(cur) = t {
            let Some(prev) = self.arena.prev(cur) else {
                break;
            };
            let thread = self.arena.thread(cur).map(ThreadHandle::from_inner);
            if !f(cur, thread) {
                return;
            }
            t = Some(prev);
        }
    }

    pub fn has_queued_threads(&self) -> bool {
        let _guard = epoch::pin();
        let h = self.head();
        let mut t = self.tail();
        while let Some(cur) = t {
            if Some(cur) == h {
                break;
            }
            if !self.arena.status(cur).is_cancelled() {
                return true;
            }
            t = self.arena.prev(cur);
        }
        false
    }

    /// Whether anything ever contended (the dummy head exists)
    pub fn has_contended(&self) -> bool {
        self.head().is_some()
    }

    pub fn first_queued_thread(&self) -> Option<ThreadHandle> {
        let _guard = epoch::pin();
        if let Some(h) = self.head() {
            if let Some(s) = self.arena.next(h) {
                if self.arena.prev(s).is_some() {
                    if let Some(thread) = self.arena.thread(s) {
                        return Some(ThreadHandle::from_inner(thread));
                    }
                }
            }
        }
        let mut first = None;
        self.for_each_queued(|_, thread| {
            if thread.is_some() {
                first = thread;
            }
            true
        });
        first
    }

    /// Whether some other thread has been waiting longer than the caller
    pub fn has_queued_predecessors(&self, me: ContextId) -> bool {
        self.first_queued_thread().is_some_and(|t| t.id() != me)
    }

    /// Whether the apparent first waiter is exclusive
    pub fn first_queued_is_exclusive(&self) -> bool {
        let _guard = epoch::pin();
        let Some(h) = self.head() else {
            return false;
        };
        let Some(s) = self.arena.next(h) else {
            return false;
        };
        self.arena.mode(s) == Some(WaiterMode::Exclusive) && self.arena.thread(s).is_some()
    }

    pub fn queue_length(&self) -> usize {
        let mut n = 0;
        self.for_each_queued(|_, thread| {
            n += thread.is_some() as usize;
            true
        });
        n
    }

    pub fn queued_threads(&self) -> Vec<ThreadHandle> {
        self.queued_threads_where(|_| true)
    }

    pub(crate) fn queued_threads_where(&self, filter: impl Fn(WaiterMode) -> bool) -> Vec<ThreadHandle> {
        let mut threads = Vec::new();
        self.for_each_queued(|node, thread| {
            if let Some(thread) = thread {
                if self.arena.mode(node).is_some_and(&filter) {
                    threads.push(thread);
                }
            }
            true
        });
        threads
    }

    pub fn is_queued(&self, thread: &ThreadHandle) -> bool {
        let mut found = false;
        self.for_each_queued(|_, t| {
            found = t.as_ref() == Some(thread);
            !found
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(n: usize) -> (WaitQueue, Vec<WaiterRef>) {
        let queue = WaitQueue::new();
        let me = ThreadHandle::current();
        let nodes = (0..n)
            .map(|_| {
                let node = queue.allocate(WaiterMode::Exclusive, &me).unwrap();
                while !queue.try_enqueue(node).unwrap() {}
                node
            })
            .collect();
        (queue, nodes)
    }

    #[test]
    fn test_enqueue_is_fifo() {
        let (queue, nodes) = queue_with(3);
        assert!(queue.has_contended());
        assert_eq!(queue.tail(), Some(nodes[2]));
        assert_eq!(queue.arena.prev(nodes[2]), Some(nodes[1]));
        assert_eq!(queue.arena.next(nodes[0]), Some(nodes[1]));
        assert_eq!(queue.arena.next(queue.head().unwrap()), Some(nodes[0]));
        assert_eq!(queue.queue_length(), 3);
        assert!(queue.has_queued_threads());
    }

    #[test]
    fn test_cancel_tail_unlinks() {
        let (queue, nodes) = queue_with(2);
        queue.cancel(nodes[1]);
        assert_eq!(queue.tail(), Some(nodes[0]));
        assert_eq!(queue.arena.next(nodes[0]), None);
        assert_eq!(queue.queue_length(), 1);
        assert!(queue.contains(nodes[0]));
    }

    #[test]
    fn test_cancel_middle_is_skipped_by_wake() {
        let (queue, nodes) = queue_with(3);
        queue.cancel(nodes[0]);
        // The live successor is found despite the stale forward link
        queue.arena.cas_status(nodes[1], WaitStatus::INITIAL, WaitStatus::READY_TO_WAKE);
        let h = queue.head().unwrap();
        assert_eq!(queue.unpark_successor(h), Some(nodes[1]));
        assert_eq!(queue.queue_length(), 2);
        // Drain the permit deposited on this thread
        ThreadHandle::current().park(Some(std::time::Instant::now()));
    }

    #[test]
    fn test_unarmed_successor_not_woken() {
        let (queue, _nodes) = queue_with(1);
        assert!(queue.dequeue_and_wake().is_none());
    }

    #[test]
    fn test_dequeue_and_wake_returns_woken_thread() {
        let (queue, nodes) = queue_with(2);
        queue.arena.cas_status(nodes[0], WaitStatus::INITIAL, WaitStatus::READY_TO_WAKE);
        assert_eq!(queue.dequeue_and_wake(), Some(ThreadHandle::current()));
        assert_eq!(queue.arena.status(nodes[0]), WaitStatus::INITIAL);
        // Disarmed: a second wake finds nobody ready
        assert!(queue.dequeue_and_wake().is_none());
        ThreadHandle::current().park(Some(std::time::Instant::now()));
    }

    #[test]
    fn test_empty_queue_introspection() {
        let queue = WaitQueue::new();
        assert!(!queue.has_contended());
        assert!(!queue.has_queued_threads());
        assert!(queue.first_queued_thread().is_none());
        assert!(!queue.first_queued_is_exclusive());
        assert!(queue.dequeue_and_wake().is_none());
    }
}
