/*!
 * Adaptive Spin-Wait Parker
 *
 * Optimized for low-latency scenarios where waits are typically very short.
 * Spins for a while before falling back to parking.
 */

use super::condvar::CondvarParker;
use super::traits::{ParkResult, Parker};
use crate::core::limits::SPIN_YIELD_INTERVAL;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Adaptive spin-wait parker
///
/// # Performance
///
/// - Ultra-low latency for short waits (< 10µs)
/// - Higher CPU usage during wait
/// - Falls back to condvar for long waits
pub struct SpinParker {
    /// Fallback condvar for long waits
    fallback: CondvarParker,
    /// Hint that a permit was deposited, readable without the fallback lock
    hint: AtomicBool,
    /// Spin duration before falling back
    spin_duration: Duration,
    /// Maximum spin iterations
    max_spins: u32,
}

impl SpinParker {
    /// Create a new adaptive spin-wait parker
    pub fn new(spin_duration: Duration, max_spins: u32) -> Self {
        Self {
            fallback: CondvarParker::new(),
            hint: AtomicBool::new(false),
            spin_duration,
            max_spins,
        }
    }

    /// Create with default parameters
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_micros(50), 500)
    }

    /// Spin until the hint is raised or the spin budget runs out
    ///
    /// Returns true if the hint was observed
    fn spin(&self, deadline: Option<Instant>) -> bool {
        let start = Instant::now();
        let mut spin_count = 0;

        loop {
            if self.hint.load(Ordering::Acquire) {
                return true;
            }

            if start.elapsed() >= self.spin_duration || spin_count >= self.max_spins {
                return false;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }

            // Yield to scheduler occasionally
            if spin_count % SPIN_YIELD_INTERVAL == 0 {
                thread::yield_now();
            } else {
                std::hint::spin_loop();
            }

            spin_count += 1;
        }
    }
}

impl Default for SpinParker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Parker for SpinParker {
    fn park(&self, deadline: Option<Instant>) -> ParkResult {
        if self.spin(deadline) && self.fallback.try_take() {
            self.hint.store(false, Ordering::Release);
            return ParkResult::Unparked;
        }

        let result = self.fallback.park(deadline);
        if result.is_unparked() {
            self.hint.store(false, Ordering::Release);
        }
        result
    }

    fn unpark(&self) {
        self.hint.store(true, Ordering::Release);
        self.fallback.unpark();
    }

    fn try_take(&self) -> bool {
        let taken = self.fallback.try_take();
        if taken {
            self.hint.store(false, Ordering::Release);
        }
        taken
    }

    fn name(&self) -> &'static str {
        "spinwait"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_spinwait_quick_wake() {
        let parker = Arc::new(SpinParker::new(Duration::from_millis(5), 10_000));
        let parker_clone = parker.clone();

        let handle = thread::spawn(move || parker_clone.park(Some(Instant::now() + Duration::from_secs(2))));

        thread::sleep(Duration::from_millis(1));
        parker.unpark();

        assert!(handle.join().unwrap().is_unparked());
    }

    #[test]
    fn test_spinwait_falls_back_to_blocking() {
        let parker = SpinParker::new(Duration::from_micros(10), 5);
        let start = Instant::now();
        let result = parker.park(Some(start + Duration::from_millis(30)));
        assert_eq!(result, ParkResult::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
