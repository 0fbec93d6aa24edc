/*!
 * Count-Down Latch
 *
 * One-shot gate: state is the remaining count, waiters pass once it reaches
 * zero, and zero is terminal.
 */

use crate::core::errors::{SyncError, SyncResult};
use crate::synchronizer::{AcquirePolicy, SyncCore, Synchronizer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct LatchPolicy;

impl AcquirePolicy for LatchPolicy {
    fn try_acquire_shared(&self, core: &SyncCore, _arg: i64) -> SyncResult<i64> {
        Ok(if core.state() == 0 { 1 } else { -1 })
    }

    fn try_release_shared(&self, core: &SyncCore, _arg: i64) -> SyncResult<bool> {
        loop {
            let c = core.state();
            if c == 0 {
                return Ok(false);
            }
            let next = c - 1;
            if core.compare_and_set_state(c, next) {
                return Ok(next == 0);
            }
        }
    }
}

#[derive(Clone)]
pub struct CountDownLatch {
    sync: Arc<Synchronizer<LatchPolicy>>,
}

impl CountDownLatch {
    pub fn new(count: i64) -> SyncResult<Self> {
        if count < 0 {
            return Err(SyncError::InvalidArgument("latch count must be non-negative"));
        }
        Ok(Self {
            sync: Arc::new(Synchronizer::new(count, LatchPolicy)),
        })
    }

    /// Block until the count reaches zero; interruptible
    pub fn wait(&self) -> SyncResult<()> {
        self.sync.acquire_shared_interruptibly(1)
    }

    /// Block until zero or `timeout`; `Ok(false)` if the time elapsed first
    pub fn wait_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_shared_for(1, timeout)
    }

    /// Decrement the count, opening the gate when it reaches zero
    pub fn count_down(&self) {
        // The latch hooks never fail
        if let Ok(true) = self.sync.release_shared(1) {
            debug!("latch opened");
        }
    }

    pub fn count(&self) -> i64 {
        self.sync.state()
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }
}

impl fmt::Debug for CountDownLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountDownLatch[count = {}]", self.count())
    }
}
