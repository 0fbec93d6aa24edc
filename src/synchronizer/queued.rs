/*!
 * Queued Acquisition
 *
 * The main acquire loop shared by every blocking entry point.
 *
 * # Loop
 *
 * 1. Skip a cancelled predecessor and retry
 * 2. When first in line (or not yet queued), call the policy hook
 * 3. Not yet queued: allocate a waiter, then link it in
 * 4. Arm the waiter (`ReadyToWake`) and retry once more before parking
 * 5. Park; on wake clear the status and loop
 *
 * Arming before the final retry pairs with the release path, which stores
 * the state before it reads the waiter's status.
 */

use super::arena::{WaitStatus, WaiterMode, WaiterRef};
use super::policy::AcquirePolicy;
use super::Synchronizer;
use crate::core::context::ThreadHandle;
use crate::core::errors::SyncResult;
use crossbeam_epoch as epoch;
use std::time::Instant;
use tracing::{debug, trace};

/// How a queued acquire ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquireOutcome {
    Acquired,
    TimedOut,
    Interrupted,
}

impl<P: AcquirePolicy> Synchronizer<P> {
    /// Call the mode's hook; shared success is `r >= 0`
    #[inline]
    fn try_acquire_mode(&self, mode: WaiterMode, arg: i64) -> SyncResult<Option<i64>> {
        match mode {
            WaiterMode::Exclusive => Ok(self
                .policy
                .try_acquire_exclusive(&self.core, arg)?
                .then_some(0)),
            WaiterMode::Shared => {
                let r = self.policy.try_acquire_shared(&self.core, arg)?;
                Ok((r >= 0).then_some(r))
            }
        }
    }

    /// Block until acquired, interrupted (if `interruptible`) or past `deadline`
    ///
    /// `preset` is a waiter already linked into the queue by a condition
    /// transfer. Any waiter that gives up is removed before returning.
    pub(crate) fn acquire_queued(
        &self,
        preset: Option<WaiterRef>,
        arg: i64,
        mode: WaiterMode,
        interruptible: bool,
        deadline: Option<Instant>,
    ) -> SyncResult<AcquireOutcome> {
        let queue = &self.core.queue;
        let arena = &queue.arena;
        let me = ThreadHandle::current();

        let mut node = preset;
        let mut spins: u8 = 0;
        let mut post_spins: u8 = 0;
        let mut interrupted = false;
        let outcome;

        loop {
            let guard = epoch::pin();
            let pred = node.and_then(|n| arena.prev(n));
            let mut first = false;

            if let (Some(n), Some(p)) = (node, pred) {
                first = queue.head() == Some(p);
                if !first && arena.status(p).is_cancelled() {
                    queue.skip_cancelled(n, p, &guard);
                    continue;
                }
            }

            if first || pred.is_none() {
                let acquired = match self.try_acquire_mode(mode, arg) {
                    Ok(acquired) => acquired,
                    Err(e) => {
                        drop(guard);
                        if let Some(n) = node {
                            queue.cancel(n);
                        }
                        return Err(e);
                    }
                };
                if let Some(r) = acquired {
                    match node {
                        Some(n) if first => {
                            let old_status = queue.set_head(n, &guard);
                            if mode == WaiterMode::Shared {
                                self.propagate_shared(n, r, old_status);
                            }
                        }
                        Some(n) => queue.discard(n),
                        None => {}
                    }
                    if interrupted {
                        me.restore_interrupt();
                    }
                    return Ok(AcquireOutcome::Acquired);
                }
            }

            let Some(n) = node else {
                node = Some(queue.allocate(mode, &me)?);
                continue;
            };

            if pred.is_none() {
                queue.try_enqueue(n)?;
                continue;
            }

            if first && spins > 0 {
                spins -= 1;
                std::hint::spin_loop();
                continue;
            }

            if arena.status(n) == WaitStatus::INITIAL {
                arena.cas_status(n, WaitStatus::INITIAL, WaitStatus::READY_TO_WAKE);
                continue;
            }

            post_spins = (post_spins << 1) | 1;
            spins = post_spins;
            drop(guard);

            if deadline.is_some_and(|d| Instant::now() >= d) {
                outcome = AcquireOutcome::TimedOut;
                break;
            }
            queue.stats.record_park();
            trace!(waiter = ?n, "park");
            me.park(deadline);
            arena.set_status(n, WaitStatus::INITIAL);

            if me.take_interrupted() {
                interrupted = true;
                if interruptible {
                    outcome = AcquireOutcome::Interrupted;
                    break;
                }
            }
        }

        if let Some(n) = node {
            debug!(waiter = ?n, ?outcome, "acquire cancelled");
            queue.cancel(n);
        }
        Ok(outcome)
    }

    /// After a shared acquire, wake the next shared waiter when more may succeed
    fn propagate_shared(&self, node: WaiterRef, r: i64, old_head: WaitStatus) {
        let queue = &self.core.queue;
        let arena = &queue.arena;
        let marked = old_head.contains(WaitStatus::SHARED_PROPAGATE)
            || arena.status(node).contains(WaitStatus::SHARED_PROPAGATE);
        if r > 0 || marked {
            let next_is_shared = arena
                .next(node)
                .map_or(true, |s| arena.mode(s) != Some(WaiterMode::Exclusive));
            if next_is_shared {
                queue.release_shared_signal();
            }
        }
    }
}
