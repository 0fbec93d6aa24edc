/*!
 * Synchronizer State
 *
 * The single signed word whose meaning each acquire policy defines
 */

use std::sync::atomic::{AtomicI64, Ordering};

/// Atomic signed state word
///
/// All accesses are sequentially consistent. The wait queue relies on a
/// release's state store being ordered before its read of a waiter's status.
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub struct AtomicState {
    value: AtomicI64,
}

impl AtomicState {
    pub const fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set(&self, new: i64) {
        self.value.store(new, Ordering::SeqCst);
    }

    /// CAS the state; failure is a `false` return, never an error
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_semantics() {
        let state = AtomicState::new(0);
        assert!(state.compare_and_set(0, 1));
        assert!(!state.compare_and_set(0, 2));
        assert_eq!(state.get(), 1);
        state.set(-5);
        assert_eq!(state.get(), -5);
    }
}
