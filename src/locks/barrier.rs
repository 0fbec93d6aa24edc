/*!
 * Cyclic Barrier
 *
 * Reusable N-party rendezvous built from a `ReentrantMutex` and one
 * `Condition`. Each trip starts a new generation; a broken generation stays
 * broken until `reset`.
 */

use super::{Lock, ReentrantMutex, ReentrantPolicy};
use crate::core::context::ThreadHandle;
use crate::core::errors::{SyncError, SyncResult};
use crate::synchronizer::Condition;
use arc_swap::ArcSwap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

type BarrierAction = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct Generation {
    broken: AtomicBool,
}

pub struct CyclicBarrier {
    lock: ReentrantMutex,
    trip: Condition<ReentrantPolicy>,
    parties: usize,
    action: Option<BarrierAction>,
    generation: ArcSwap<Generation>,
    /// Parties still to arrive in the current generation
    count: AtomicUsize,
}

impl CyclicBarrier {
    pub fn new(parties: usize) -> SyncResult<Self> {
        Self::build(parties, None)
    }

    /// Barrier whose last arriving party runs `action` before the others resume
    pub fn with_action<F>(parties: usize, action: F) -> SyncResult<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(parties, Some(Box::new(action)))
    }

    fn build(parties: usize, action: Option<BarrierAction>) -> SyncResult<Self> {
        if parties == 0 {
            return Err(SyncError::InvalidArgument("barrier needs at least one party"));
        }
        let lock = ReentrantMutex::new();
        let trip = lock.new_condition()?;
        Ok(Self {
            lock,
            trip,
            parties,
            action,
            generation: ArcSwap::from_pointee(Generation::default()),
            count: AtomicUsize::new(parties),
        })
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Wait for all parties; returns this party's arrival index
    ///
    /// Index `parties - 1` arrived first, `0` arrived last.
    pub fn wait(&self) -> SyncResult<usize> {
        self.do_wait(None)
    }

    /// Like `wait`, but a timeout breaks the barrier and fails with `Timeout`
    pub fn wait_for(&self, timeout: Duration) -> SyncResult<usize> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.do_wait(Some(deadline)),
            None => self.do_wait(None),
        }
    }

    fn do_wait(&self, deadline: Option<Instant>) -> SyncResult<usize> {
        self.lock.lock()?;
        let result = self.arrive(deadline);
        self.lock.unlock()?;
        result
    }

    /// Called with the lock held
    fn arrive(&self, deadline: Option<Instant>) -> SyncResult<usize> {
        let g = self.generation.load_full();
        if g.broken.load(Ordering::SeqCst) {
            return Err(SyncError::BrokenBarrier);
        }
        if crate::core::context::interrupted() {
            self.break_barrier()?;
            return Err(SyncError::Interrupted);
        }

        let index = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        if index == 0 {
            if let Some(action) = &self.action {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| action())) {
                    self.break_barrier()?;
                    // Leave the lock free for the other parties before unwinding
                    self.lock.unlock()?;
                    panic::resume_unwind(payload);
                }
            }
            self.next_generation()?;
            debug!(parties = self.parties, "barrier tripped");
            return Ok(0);
        }

        loop {
            let waited = match deadline {
                None => self.trip.wait().map(|_| true),
                Some(deadline) => self.trip.wait_until(deadline),
            };
            let signalled = match waited {
                Ok(signalled) => signalled,
                Err(SyncError::Interrupted) => {
                    let current = self.generation.load_full();
                    if Arc::ptr_eq(&g, &current) && !g.broken.load(Ordering::SeqCst) {
                        self.break_barrier()?;
                        return Err(SyncError::Interrupted);
                    }
                    // Tripped or broken already; keep the interrupt for the caller
                    ThreadHandle::current().restore_interrupt();
                    true
                }
                Err(e) => return Err(e),
            };

            if g.broken.load(Ordering::SeqCst) {
                return Err(SyncError::BrokenBarrier);
            }
            if !Arc::ptr_eq(&g, &self.generation.load_full()) {
                return Ok(index);
            }
            if !signalled {
                self.break_barrier()?;
                return Err(SyncError::Timeout("barrier wait timed out"));
            }
        }
    }

    fn break_barrier(&self) -> SyncResult<()> {
        self.generation.load().broken.store(true, Ordering::SeqCst);
        self.count.store(self.parties, Ordering::SeqCst);
        debug!("barrier broken");
        self.trip.signal_all()
    }

    fn next_generation(&self) -> SyncResult<()> {
        self.trip.signal_all()?;
        self.count.store(self.parties, Ordering::SeqCst);
        self.generation.store(Arc::new(Generation::default()));
        Ok(())
    }

    pub fn is_broken(&self) -> SyncResult<bool> {
        self.lock.lock()?;
        let broken = self.generation.load().broken.load(Ordering::SeqCst);
        self.lock.unlock()?;
        Ok(broken)
    }

    /// Break the current generation and start a fresh one
    pub fn reset(&self) -> SyncResult<()> {
        self.lock.lock()?;
        let result = self.break_barrier().and_then(|_| self.next_generation());
        self.lock.unlock()?;
        result
    }

    pub fn number_waiting(&self) -> SyncResult<usize> {
        self.lock.lock()?;
        let waiting = self.parties - self.count.load(Ordering::SeqCst);
        self.lock.unlock()?;
        Ok(waiting)
    }
}

impl fmt::Debug for CyclicBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.parties)
            .field("count", &self.count.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_party_trips_immediately() {
        let barrier = CyclicBarrier::new(1).unwrap();
        assert_eq!(barrier.wait().unwrap(), 0);
        assert_eq!(barrier.wait().unwrap(), 0);
        assert!(!barrier.is_broken().unwrap());
    }

    #[test]
    fn test_zero_parties_rejected() {
        assert!(matches!(
            CyclicBarrier::new(0),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_timeout_breaks_barrier() {
        let barrier = CyclicBarrier::new(2).unwrap();
        assert!(matches!(
            barrier.wait_for(Duration::from_millis(20)),
            Err(SyncError::Timeout(_))
        ));
        assert!(barrier.is_broken().unwrap());
        assert_eq!(barrier.wait(), Err(SyncError::BrokenBarrier));

        barrier.reset().unwrap();
        assert!(!barrier.is_broken().unwrap());
        assert_eq!(barrier.number_waiting().unwrap(), 0);
    }
}
