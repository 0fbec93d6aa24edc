/*!
 * Condvar-Based Parker
 *
 * Cross-platform fallback using parking_lot::Condvar for reliability.
 * The permit lives under the mutex, so deposit and consumption are ordered
 * by the lock itself.
 */

use super::traits::{ParkResult, Parker};
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Condvar-based one-shot parker
#[repr(C, align(64))] // Cache-line aligned to prevent false sharing
pub struct CondvarParker {
    permit: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarParker {
    /// Create a parker with no pending permit
    pub const fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }
}

impl Default for CondvarParker {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker for CondvarParker {
    fn park(&self, deadline: Option<Instant>) -> ParkResult {
        let mut permit = self.permit.lock();

        while !*permit {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut permit, deadline).timed_out() {
                        if *permit {
                            break;
                        }
                        return ParkResult::TimedOut;
                    }
                }
                None => self.condvar.wait(&mut permit),
            }
        }

        *permit = false;
        ParkResult::Unparked
    }

    fn unpark(&self) {
        let mut permit = self.permit.lock();
        *permit = true;
        drop(permit);
        self.condvar.notify_one();
    }

    fn try_take(&self) -> bool {
        std::mem::replace(&mut *self.permit.lock(), false)
    }

    fn name(&self) -> &'static str {
        "condvar"
    }
}
