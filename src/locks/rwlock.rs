/*!
 * Read/Write Lock
 *
 * One state word: the upper 32 bits count read holds, the lower 32 bits count
 * the writer's reentrant holds.
 *
 * - Readers are shared waiters, the writer is exclusive
 * - Non-fair readers block when a writer is first in the queue, so a steady
 *   reader stream cannot starve writers; a thread that already holds a read
 *   lock may still reenter
 * - The writer may take the read lock, then release the write lock to downgrade
 */

use super::Lock;
use crate::core::context::{current_id, ContextId, ThreadHandle};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::{RW_MAX_COUNT, RW_SHARED_SHIFT};
use crate::synchronizer::{AcquirePolicy, Condition, SyncCore, Synchronizer};
use parking_lot::Mutex as HoldMutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const SHARED_UNIT: i64 = 1 << RW_SHARED_SHIFT;
const EXCLUSIVE_MASK: i64 = SHARED_UNIT - 1;

#[inline]
fn shared_count(c: i64) -> i64 {
    c >> RW_SHARED_SHIFT
}

#[inline]
fn exclusive_count(c: i64) -> i64 {
    c & EXCLUSIVE_MASK
}

#[derive(Debug, Default)]
pub struct RwPolicy {
    fair: bool,
    /// Read holds per thread
    read_holds: HoldMutex<HashMap<ContextId, i64>>,
}

impl RwPolicy {
    fn reader_should_block(&self, core: &SyncCore) -> bool {
        if self.fair {
            core.has_queued_predecessors()
        } else {
            core.first_queued_is_exclusive()
        }
    }

    fn writer_should_block(&self, core: &SyncCore) -> bool {
        self.fair && core.has_queued_predecessors()
    }

    fn read_hold_count(&self, me: ContextId) -> i64 {
        self.read_holds.lock().get(&me).copied().unwrap_or(0)
    }
}

impl AcquirePolicy for RwPolicy {
    fn try_acquire_exclusive(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        let me = current_id();
        let c = core.state();
        let w = exclusive_count(c);
        if c != 0 {
            // Readers present, or another writer
            if w == 0 || core.exclusive_owner() != Some(me) {
                return Ok(false);
            }
            if w + arg > RW_MAX_COUNT {
                return Err(SyncError::IllegalState("maximum write lock count exceeded"));
            }
            core.set_state(c + arg);
            return Ok(true);
        }
        if self.writer_should_block(core) || !core.compare_and_set_state(c, c + arg) {
            return Ok(false);
        }
        core.set_exclusive_owner(Some(me));
        Ok(true)
    }

    fn try_release_exclusive(&self, core: &SyncCore, arg: i64) -> SyncResult<bool> {
        if !self.is_held_exclusively(core) {
            return Err(SyncError::IllegalMonitorState(
                "write unlock by a thread that does not hold the write lock",
            ));
        }
        let next = core.state() - arg;
        let free = exclusive_count(next) == 0;
        if free {
            core.set_exclusive_owner(None);
        }
        core.set_state(next);
        Ok(free)
    }

    fn try_acquire_shared(&self, core: &SyncCore, _arg: i64) -> SyncResult<i64> {
        let me = current_id();
        loop {
            let c = core.state();
            let writer_owned_by_me = core.exclusive_owner() == Some(me);
            if exclusive_count(c) != 0 && !writer_owned_by_me {
                return Ok(-1);
            }
            if !writer_owned_by_me && self.reader_should_block(core) && self.read_hold_count(me) == 0 {
                return Ok(-1);
            }
            if shared_count(c) == RW_MAX_COUNT {
                return Err(SyncError::IllegalState("maximum read lock count exceeded"));
            }
            if core.compare_and_set_state(c, c + SHARED_UNIT) {
                *self.read_holds.lock().entry(me).or_insert(0) += 1;
                return Ok(1);
            }
        }
    }

    fn try_release_shared(&self, core: &SyncCore, _arg: i64) -> SyncResult<bool> {
        let me = current_id();
        {
            let mut holds = self.read_holds.lock();
            match holds.get_mut(&me) {
                Some(n) if *n > 1 => *n -= 1,
                Some(_) => {
                    holds.remove(&me);
                }
                None => {
                    return Err(SyncError::IllegalMonitorState(
                        "read unlock by a thread that does not hold the read lock",
                    ))
                }
            }
        }
        loop {
            let c = core.state();
            let next = c - SHARED_UNIT;
            if core.compare_and_set_state(c, next) {
                // Freeing the read lock only matters to waiting writers
                return Ok(next == 0);
            }
        }
    }

    fn is_held_exclusively(&self, core: &SyncCore) -> bool {
        exclusive_count(core.state()) != 0 && core.is_owned_by_current_thread()
    }
}

/// Reentrant read/write lock
///
/// # Examples
///
/// ```
/// use queue_sync::locks::{Lock, RwLock};
///
/// let rw = RwLock::new();
/// rw.write_lock().lock().unwrap();
/// rw.read_lock().lock().unwrap();   // downgrade
/// rw.write_lock().unlock().unwrap();
/// assert_eq!(rw.read_lock_count(), 1);
/// rw.read_lock().unlock().unwrap();
/// ```
#[derive(Clone)]
pub struct RwLock {
    sync: Arc<Synchronizer<RwPolicy>>,
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLock {
    pub fn new() -> Self {
        Self::with_fairness(false)
    }

    pub fn with_fairness(fair: bool) -> Self {
        Self {
            sync: Arc::new(Synchronizer::new(
                0,
                RwPolicy {
                    fair,
                    read_holds: HoldMutex::new(HashMap::new()),
                },
            )),
        }
    }

    pub fn read_lock(&self) -> ReadLock<'_> {
        ReadLock { rw: self }
    }

    pub fn write_lock(&self) -> WriteLock<'_> {
        WriteLock { rw: self }
    }

    pub fn is_fair(&self) -> bool {
        self.sync.policy().fair
    }

    /// Read holds across all threads
    pub fn read_lock_count(&self) -> i64 {
        shared_count(self.sync.state())
    }

    pub fn read_hold_count(&self) -> i64 {
        self.sync.policy().read_hold_count(current_id())
    }

    pub fn is_write_locked(&self) -> bool {
        exclusive_count(self.sync.state()) != 0
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.sync.is_held_exclusively()
    }

    /// Write holds by the calling thread
    pub fn write_hold_count(&self) -> i64 {
        if self.sync.is_held_exclusively() {
            exclusive_count(self.sync.state())
        } else {
            0
        }
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }

    pub fn queued_writer_threads(&self) -> Vec<ThreadHandle> {
        self.sync.exclusive_queued_threads()
    }

    pub fn queued_reader_threads(&self) -> Vec<ThreadHandle> {
        self.sync.shared_queued_threads()
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<RwPolicy>> {
        &self.sync
    }
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.sync.state();
        write!(
            f,
            "RwLock[write locks = {}, read locks = {}]",
            exclusive_count(c),
            shared_count(c)
        )
    }
}

/// Shared view of an `RwLock`
#[derive(Clone, Copy)]
pub struct ReadLock<'a> {
    rw: &'a RwLock,
}

impl Lock for ReadLock<'_> {
    type Policy = RwPolicy;

    fn lock(&self) -> SyncResult<()> {
        self.rw.sync.acquire_shared(1)
    }

    fn lock_interruptibly(&self) -> SyncResult<()> {
        self.rw.sync.acquire_shared_interruptibly(1)
    }

    fn try_lock(&self) -> SyncResult<bool> {
        self.rw.sync.try_acquire_shared(1)
    }

    fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.rw.sync.try_acquire_shared_for(1, timeout)
    }

    fn unlock(&self) -> SyncResult<()> {
        self.rw.sync.release_shared(1).map(|_| ())
    }

    fn new_condition(&self) -> SyncResult<Condition<RwPolicy>> {
        Err(SyncError::Unsupported("read locks do not support conditions"))
    }
}

/// Exclusive view of an `RwLock`
#[derive(Clone, Copy)]
pub struct WriteLock<'a> {
    rw: &'a RwLock,
}

impl WriteLock<'_> {
    pub fn hold_count(&self) -> i64 {
        self.rw.write_hold_count()
    }
}

impl Lock for WriteLock<'_> {
    type Policy = RwPolicy;

    fn lock(&self) -> SyncResult<()> {
        self.rw.sync.acquire(1)
    }

    fn lock_interruptibly(&self) -> SyncResult<()> {
        self.rw.sync.acquire_interruptibly(1)
    }

    fn try_lock(&self) -> SyncResult<bool> {
        self.rw.sync.try_acquire(1)
    }

    fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.rw.sync.try_acquire_for(1, timeout)
    }

    fn unlock(&self) -> SyncResult<()> {
        self.rw.sync.release(1).map(|_| ())
    }

    fn new_condition(&self) -> SyncResult<Condition<RwPolicy>> {
        Ok(self.rw.sync.new_condition())
    }
}
