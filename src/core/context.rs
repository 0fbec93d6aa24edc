/*!
 * Execution Context
 *
 * Per-thread handle carrying a stable id, the thread's parker and its
 * interrupt flag. Waiters hold a clone of the handle so any thread can wake
 * or interrupt them.
 */

use crate::core::sync::{default_config, ParkResult, ThreadParker};
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable numeric identity of a thread of control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ContextId(NonZeroU64);

impl ContextId {
    fn next() -> Self {
        let raw = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and a u64 does not wrap in practice
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Raw id value, never zero
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }

    #[inline]
    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

pub(crate) struct ThreadInner {
    id: ContextId,
    name: Option<String>,
    parker: ThreadParker,
    interrupted: AtomicBool,
}

/// Cloneable handle to a thread of control
#[derive(Clone)]
pub struct ThreadHandle {
    inner: Arc<ThreadInner>,
}

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle::materialize();
}

impl ThreadHandle {
    fn materialize() -> Self {
        let config = default_config();
        Self {
            inner: Arc::new(ThreadInner {
                id: ContextId::next(),
                name: std::thread::current().name().map(str::to_owned),
                parker: ThreadParker::new(&config),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Handle of the calling thread
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    pub(crate) fn from_inner(inner: Arc<ThreadInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ThreadInner> {
        &self.inner
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Set the interrupt flag and wake the thread if it is parked
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        trace!(thread = %self.inner.id, "interrupt");
        self.inner.parker.unpark();
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Clear the interrupt flag, returning its previous value
    pub(crate) fn take_interrupted(&self) -> bool {
        self.inner.interrupted.swap(false, Ordering::SeqCst)
    }

    /// Re-assert an interrupt that was swallowed by an uninterruptible wait
    pub(crate) fn restore_interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
    }

    /// Deposit a wake permit for this thread
    pub fn unpark(&self) {
        self.inner.unpark();
    }

    /// Park the calling thread; only valid on the current thread's handle
    pub(crate) fn park(&self, deadline: Option<Instant>) -> ParkResult {
        self.inner.parker.park(deadline)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.inner.parker.strategy_name()
    }
}

impl ThreadInner {
    #[inline]
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub(crate) fn unpark(&self) {
        trace!(thread = %self.id, "unpark");
        self.parker.unpark();
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ThreadHandle {}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Id of the calling thread
#[inline]
pub fn current_id() -> ContextId {
    CURRENT.with(|h| h.inner.id)
}

/// Test-and-clear the calling thread's interrupt flag
pub fn interrupted() -> bool {
    CURRENT.with(|h| h.take_interrupted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_current_is_stable() {
        let a = ThreadHandle::current();
        let b = ThreadHandle::current();
        assert_eq!(a, b);
        assert_eq!(a.id(), current_id());

        let other = thread::spawn(current_id).join().unwrap();
        assert_ne!(other, a.id());
    }

    #[test]
    fn test_interrupt_flag_test_and_clear() {
        let me = ThreadHandle::current();
        assert!(!interrupted());
        me.interrupt();
        assert!(me.is_interrupted());
        assert!(interrupted());
        assert!(!me.is_interrupted());
        // The interrupt also left a permit behind; drain it
        me.park(Some(Instant::now()));
    }

    #[test]
    fn test_interrupt_wakes_parked_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            tx.send(ThreadHandle::current()).unwrap();
            let me = ThreadHandle::current();
            while !me.is_interrupted() {
                me.park(Some(Instant::now() + Duration::from_secs(5)));
            }
            interrupted()
        });

        let target = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        target.interrupt();
        assert!(handle.join().unwrap());
    }
}
