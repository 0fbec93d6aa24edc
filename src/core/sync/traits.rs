/*!
 * Parking Traits
 *
 * Core abstraction for blocking a thread of control until it is woken.
 *
 * # Design: One-Shot Permit
 *
 * A parker holds at most one wake permit. `unpark` deposits the permit (waking
 * the parked thread if there is one); `park` consumes it, blocking until it is
 * available or the deadline passes. An `unpark` that races ahead of `park` is
 * therefore never lost, which is what lets the wait queue arm a waiter, recheck
 * the state, and only then block.
 */

use std::time::Instant;

/// Result of a park operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkResult {
    /// A permit was consumed
    Unparked,
    /// The deadline passed without a permit
    TimedOut,
}

impl ParkResult {
    /// Check if the park ended because of a permit
    #[inline(always)]
    pub fn is_unparked(&self) -> bool {
        matches!(self, ParkResult::Unparked)
    }
}

/// Blocking capability provided by the execution-context layer
///
/// Implementations must be:
/// - **Thread-safe**: `unpark` may be called from any thread
/// - **Permit-based**: an `unpark` before `park` makes the next `park` return immediately
/// - **Spurious-tolerant callers**: callers always recheck their condition, so an
///   implementation may return `Unparked` early without a matching `unpark`
pub trait Parker: Send + Sync {
    /// Block until a permit is available or `deadline` passes
    fn park(&self, deadline: Option<Instant>) -> ParkResult;

    /// Make a permit available, waking the parked thread if any
    fn unpark(&self);

    /// Consume a pending permit without blocking
    fn try_take(&self) -> bool;

    /// Get strategy name for debugging
    fn name(&self) -> &'static str;
}
