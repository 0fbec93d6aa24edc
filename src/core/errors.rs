/*!
 * Error Types
 * Centralized error handling with thiserror and miette diagnostics
 */

use miette::Diagnostic;
use thiserror::Error;

/// Result type for synchronizer operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the synchronizer and the locks built on it
///
/// Transient CAS failures never appear here: they are retried internally.
/// Timeouts on `try_*_for` variants are reported as `Ok(false)`, not as errors.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SyncError {
    #[error("Illegal monitor state: {0}")]
    #[diagnostic(
        code(sync::illegal_monitor_state),
        help("The calling thread must hold the lock exclusively for this operation.")
    )]
    IllegalMonitorState(&'static str),

    #[error("Thread was interrupted while waiting")]
    #[diagnostic(
        code(sync::interrupted),
        help("Another thread called interrupt() on this thread's handle.")
    )]
    Interrupted,

    #[error("Illegal state: {0}")]
    #[diagnostic(
        code(sync::illegal_state),
        help("The object was used with a synchronizer it does not belong to, or a counter overflowed.")
    )]
    IllegalState(&'static str),

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(sync::invalid_argument))]
    InvalidArgument(&'static str),

    #[error("Operation not supported by this policy: {0}")]
    #[diagnostic(
        code(sync::unsupported),
        help("The acquire policy does not implement this hook.")
    )]
    Unsupported(&'static str),

    #[error("Lock is already held by the current thread")]
    #[diagnostic(
        code(sync::already_held),
        help("This lock is not reentrant. Use ReentrantMutex for nested acquisition.")
    )]
    AlreadyHeld,

    #[error("Barrier is broken")]
    #[diagnostic(
        code(sync::broken_barrier),
        help("A party was interrupted or timed out, or the barrier was reset. Call reset() before reuse.")
    )]
    BrokenBarrier,

    #[error("Timed out: {0}")]
    #[diagnostic(code(sync::timeout))]
    Timeout(&'static str),

    #[error("Waiter arena exhausted")]
    #[diagnostic(
        code(sync::capacity_exhausted),
        help("Too many threads are blocked on one synchronizer at the same time.")
    )]
    CapacityExhausted,
}

impl SyncError {
    /// Whether this error means the wait was cancelled from outside
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SyncError::Interrupted | SyncError::Timeout(_))
    }
}
