/*!
 * Exchanger
 *
 * Pairwise rendezvous: the first thread offers a value and waits, the second
 * takes it and leaves its own value as the response. Built from a
 * `ReentrantMutex` and one `Condition`; the slot itself is only touched
 * while the mutex is held.
 */

use super::{Lock, ReentrantMutex, ReentrantPolicy};
use crate::core::context::ThreadHandle;
use crate::core::errors::{SyncError, SyncResult};
use crate::synchronizer::Condition;
use parking_lot::Mutex as SlotMutex;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::trace;

struct Slot<T> {
    offer: Option<T>,
    response: Option<T>,
    /// Bumped each time an offer is matched
    phase: u64,
}

pub struct Exchanger<T> {
    lock: ReentrantMutex,
    changed: Condition<ReentrantPolicy>,
    slot: SlotMutex<Slot<T>>,
}

impl<T: Send> Exchanger<T> {
    pub fn new() -> SyncResult<Self> {
        let lock = ReentrantMutex::new();
        let changed = lock.new_condition()?;
        Ok(Self {
            lock,
            changed,
            slot: SlotMutex::new(Slot {
                offer: None,
                response: None,
                phase: 0,
            }),
        })
    }

    /// Swap `value` with another thread's; interruptible
    pub fn exchange(&self, value: T) -> SyncResult<T> {
        self.do_exchange(value, None)
    }

    /// Swap within `timeout`, failing with `Timeout` if no partner arrives
    pub fn exchange_for(&self, value: T, timeout: Duration) -> SyncResult<T> {
        self.do_exchange(value, Instant::now().checked_add(timeout))
    }

    fn do_exchange(&self, value: T, deadline: Option<Instant>) -> SyncResult<T> {
        self.lock.lock_interruptibly()?;
        let result = self.rendezvous(value, deadline);
        self.lock.unlock()?;
        result
    }

    fn wait_changed(&self, deadline: Option<Instant>) -> SyncResult<bool> {
        match deadline {
            Some(deadline) => self.changed.wait_until(deadline),
            None => self.changed.wait().map(|_| true),
        }
    }

    /// Called with the lock held
    fn rendezvous(&self, value: T, deadline: Option<Instant>) -> SyncResult<T> {
        // A matched pair is still collecting its response
        while self.slot.lock().response.is_some() {
            if !self.wait_changed(deadline)? && self.slot.lock().response.is_some() {
                return Err(SyncError::Timeout("exchange timed out"));
            }
        }

        {
            let mut slot = self.slot.lock();
            if let Some(offered) = slot.offer.take() {
                slot.response = Some(value);
                slot.phase = slot.phase.wrapping_add(1);
                drop(slot);
                trace!("exchange matched waiting offer");
                self.changed.signal_all()?;
                return Ok(offered);
            }
            slot.offer = Some(value);
        }

        let my_phase = self.slot.lock().phase;
        let mut outcome: SyncResult<()> = Ok(());
        while self.slot.lock().phase == my_phase {
            match self.wait_changed(deadline) {
                Ok(true) => {}
                Ok(false) => {
                    outcome = Err(SyncError::Timeout("exchange timed out"));
                    break;
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let mut slot = self.slot.lock();
        if slot.phase == my_phase {
            // Unmatched: withdraw the offer
            slot.offer = None;
            return Err(outcome.err().unwrap_or(SyncError::Timeout("exchange timed out")));
        }
        let response = slot.response.take();
        drop(slot);
        if matches!(outcome, Err(SyncError::Interrupted)) {
            // Matched before the interrupt took effect
            ThreadHandle::current().restore_interrupt();
        }
        self.changed.signal_all()?;
        response.ok_or(SyncError::IllegalState("exchange response missing"))
    }
}

impl<T> fmt::Debug for Exchanger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Exchanger")
            .field("offered", &slot.offer.is_some())
            .field("phase", &slot.phase)
            .finish()
    }
}
