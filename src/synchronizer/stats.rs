/*!
 * Queue Statistics
 * Relaxed per-queue counters for diagnostics
 */

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct QueueStats {
    enqueued: AtomicU64,
    parked: AtomicU64,
    woken: AtomicU64,
    cancelled: AtomicU64,
    transferred: AtomicU64,
}

/// Point-in-time copy of the queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatsSnapshot {
    /// Waiters linked into the wait queue
    pub enqueued: u64,
    /// Park calls made by queued waiters
    pub parked: u64,
    /// Unparks issued to armed waiters
    pub woken: u64,
    /// Waiters that gave up on timeout or interrupt
    pub cancelled: u64,
    /// Condition waiters moved to the wait queue by a signal
    pub transferred: u64,
}

impl QueueStats {
    #[inline]
    pub(crate) fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_park(&self) {
        self.parked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_wake(&self) {
        self.woken.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_transfer(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            parked: self.parked.load(Ordering::Relaxed),
            woken: self.woken.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            transferred: self.transferred.load(Ordering::Relaxed),
        }
    }
}
