/*!
 * Counting Semaphore
 *
 * State is the number of available permits. Acquires are shared, so a
 * release of N permits can wake a run of queued acquirers.
 */

use crate::core::context::ThreadHandle;
use crate::core::errors::{SyncError, SyncResult};
use crate::synchronizer::{AcquirePolicy, SyncCore, Synchronizer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SemaphorePolicy {
    fair: bool,
}

impl SemaphorePolicy {
    fn drain(core: &SyncCore) -> i64 {
        loop {
            let current = core.state();
            if current == 0 || core.compare_and_set_state(current, 0) {
                return current;
            }
        }
    }

    fn reduce(core: &SyncCore, reduction: i64) -> SyncResult<()> {
        loop {
            let current = core.state();
            let next = current
                .checked_sub(reduction)
                .ok_or(SyncError::IllegalState("permit count underflow"))?;
            if core.compare_and_set_state(current, next) {
                return Ok(());
            }
        }
    }
}

impl AcquirePolicy for SemaphorePolicy {
    fn try_acquire_shared(&self, core: &SyncCore, acquires: i64) -> SyncResult<i64> {
        loop {
            if self.fair && core.has_queued_predecessors() {
                return Ok(-1);
            }
            let available = core.state();
            let Some(remaining) = available.checked_sub(acquires) else {
                return Ok(-1);
            };
            if remaining < 0 || core.compare_and_set_state(available, remaining) {
                return Ok(remaining);
            }
        }
    }

    fn try_release_shared(&self, core: &SyncCore, releases: i64) -> SyncResult<bool> {
        loop {
            let current = core.state();
            let next = current
                .checked_add(releases)
                .ok_or(SyncError::IllegalState("maximum permit count exceeded"))?;
            if core.compare_and_set_state(current, next) {
                return Ok(true);
            }
        }
    }
}

/// Counting semaphore
///
/// # Examples
///
/// ```
/// use queue_sync::locks::Semaphore;
///
/// let pool = Semaphore::new(2);
/// pool.acquire().unwrap();
/// assert!(pool.try_acquire().unwrap());
/// assert!(!pool.try_acquire().unwrap());
/// pool.release_many(2).unwrap();
/// assert_eq!(pool.available_permits(), 2);
/// ```
#[derive(Clone)]
pub struct Semaphore {
    sync: Arc<Synchronizer<SemaphorePolicy>>,
}

fn check_amount(permits: i64) -> SyncResult<()> {
    if permits < 0 {
        return Err(SyncError::InvalidArgument("permit count must be non-negative"));
    }
    Ok(())
}

impl Semaphore {
    /// Non-fair semaphore; `permits` may be negative
    pub fn new(permits: i64) -> Self {
        Self::with_fairness(permits, false)
    }

    pub fn with_fairness(permits: i64, fair: bool) -> Self {
        Self {
            sync: Arc::new(Synchronizer::new(permits, SemaphorePolicy { fair })),
        }
    }

    pub fn is_fair(&self) -> bool {
        self.sync.policy().fair
    }

    // =========================================================================
    // Single permit
    // =========================================================================

    /// Interruptible acquire of one permit
    pub fn acquire(&self) -> SyncResult<()> {
        self.sync.acquire_shared_interruptibly(1)
    }

    pub fn acquire_uninterruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_shared(1)
    }

    /// Barges even in fair mode
    pub fn try_acquire(&self) -> SyncResult<bool> {
        self.try_acquire_many(1)
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_shared_for(1, timeout)
    }

    pub fn release(&self) -> SyncResult<()> {
        self.sync.release_shared(1).map(|_| ())
    }

    // =========================================================================
    // Multiple permits
    // =========================================================================

    pub fn acquire_many(&self, permits: i64) -> SyncResult<()> {
        check_amount(permits)?;
        self.sync.acquire_shared_interruptibly(permits)
    }

    pub fn acquire_many_uninterruptibly(&self, permits: i64) -> SyncResult<()> {
        check_amount(permits)?;
        self.sync.acquire_shared(permits)
    }

    pub fn try_acquire_many(&self, permits: i64) -> SyncResult<bool> {
        check_amount(permits)?;
        let core = self.sync.core();
        loop {
            let available = core.state();
            let remaining = match available.checked_sub(permits) {
                Some(r) if r >= 0 => r,
                _ => return Ok(false),
            };
            if core.compare_and_set_state(available, remaining) {
                return Ok(true);
            }
        }
    }

    pub fn try_acquire_many_for(&self, permits: i64, timeout: Duration) -> SyncResult<bool> {
        check_amount(permits)?;
        self.sync.try_acquire_shared_for(permits, timeout)
    }

    pub fn release_many(&self, permits: i64) -> SyncResult<()> {
        check_amount(permits)?;
        self.sync.release_shared(permits).map(|_| ())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn available_permits(&self) -> i64 {
        self.sync.state()
    }

    /// Take every available permit, returning how many were taken
    pub fn drain_permits(&self) -> i64 {
        SemaphorePolicy::drain(self.sync.core())
    }

    /// Shrink the permit count without blocking; may go negative
    pub fn reduce_permits(&self, reduction: i64) -> SyncResult<()> {
        check_amount(reduction)?;
        SemaphorePolicy::reduce(self.sync.core(), reduction)
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }

    pub fn queued_threads(&self) -> Vec<ThreadHandle> {
        self.sync.queued_threads()
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<SemaphorePolicy>> {
        &self.sync
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Semaphore[permits = {}]", self.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permit_accounting() {
        let s = Semaphore::new(3);
        s.acquire_many(2).unwrap();
        assert_eq!(s.available_permits(), 1);
        assert!(!s.try_acquire_many(2).unwrap());
        s.release_many(2).unwrap();
        assert_eq!(s.drain_permits(), 3);
        assert_eq!(s.available_permits(), 0);
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let s = Semaphore::new(1);
        assert!(matches!(s.acquire_many(-1), Err(SyncError::InvalidArgument(_))));
        assert!(matches!(s.release_many(-1), Err(SyncError::InvalidArgument(_))));
        assert!(matches!(s.reduce_permits(-1), Err(SyncError::InvalidArgument(_))));
    }

    #[test]
    fn test_reduce_and_overflow() {
        let s = Semaphore::new(1);
        s.reduce_permits(3).unwrap();
        assert_eq!(s.available_permits(), -2);
        assert!(!s.try_acquire().unwrap());

        let full = Semaphore::new(i64::MAX);
        assert!(matches!(full.release(), Err(SyncError::IllegalState(_))));
    }

    #[test]
    fn test_deeply_negative_balance_grants_nothing() {
        let s = Semaphore::new(-5);
        assert!(!s.try_acquire_many(i64::MAX).unwrap());
        assert_eq!(s.available_permits(), -5);

        let min = Semaphore::new(i64::MIN);
        assert!(!min.try_acquire().unwrap());
        assert!(!min.try_acquire_for(Duration::from_millis(5)).unwrap());
        assert_eq!(min.available_permits(), i64::MIN);
        assert_eq!(min.queue_length(), 0);

        let fair = Semaphore::with_fairness(i64::MIN, true);
        assert!(!fair.try_acquire_many_for(1, Duration::from_millis(5)).unwrap());
        assert_eq!(fair.available_permits(), i64::MIN);
    }

    #[test]
    fn test_timed_acquire_expires() {
        let s = Semaphore::new(0);
        assert!(!s.try_acquire_for(Duration::from_millis(30)).unwrap());
        assert_eq!(s.queue_length(), 0);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Semaphore::new(4)), "Semaphore[permits = 4]");
    }
}
