/*!
 * Locks Built on the Synchronizer
 *
 * Each lock is a thin policy over `Synchronizer`:
 * - `Mutex`: non-reentrant mutual exclusion
 * - `ReentrantMutex`: owner-counted, fair or non-fair
 * - `RwLock`: shared readers, reentrant exclusive writer
 * - `Semaphore`: counting permits, fair or non-fair
 * - `CountDownLatch`: one-shot gate
 * - `CyclicBarrier`, `Exchanger`: built from `ReentrantMutex` + `Condition`
 */

mod barrier;
mod exchanger;
mod guard;
mod latch;
mod mutex;
mod reentrant;
mod rwlock;
mod semaphore;

use crate::core::errors::SyncResult;
use crate::synchronizer::{AcquirePolicy, Condition};
use std::time::Duration;

pub use barrier::CyclicBarrier;
pub use exchanger::Exchanger;
pub use guard::LockGuard;
pub use latch::CountDownLatch;
pub use mutex::{Mutex, MutexPolicy};
pub use reentrant::{ReentrantMutex, ReentrantPolicy};
pub use rwlock::{ReadLock, RwLock, RwPolicy, WriteLock};
pub use semaphore::{Semaphore, SemaphorePolicy};

/// Common surface of the exclusive-style locks
pub trait Lock {
    type Policy: AcquirePolicy;

    /// Block until acquired, ignoring interrupts
    fn lock(&self) -> SyncResult<()>;

    /// Block until acquired or the thread is interrupted
    fn lock_interruptibly(&self) -> SyncResult<()>;

    /// Acquire only if free right now
    fn try_lock(&self) -> SyncResult<bool>;

    /// Acquire within `timeout`; interruptible
    fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool>;

    fn unlock(&self) -> SyncResult<()>;

    /// New condition bound to this lock
    fn new_condition(&self) -> SyncResult<Condition<Self::Policy>>;

    /// Lock and return a guard that unlocks on drop
    fn guard(&self) -> SyncResult<LockGuard<'_, Self>> {
        self.lock()?;
        Ok(LockGuard::new(self))
    }
}
