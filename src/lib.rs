/*!
 * Queue Sync Library
 *
 * A queue synchronizer and the locks built on it:
 * - `synchronizer`: state word, FIFO wait queue, conditions, policy hooks
 * - `locks`: mutex, reentrant mutex, read/write lock, semaphore, latch,
 *   cyclic barrier, exchanger
 * - `core`: execution context, parking strategies, errors, limits
 * - `monitoring`: tracing setup
 */

pub mod core;
pub mod locks;
pub mod monitoring;
pub mod synchronizer;

// Re-exports
pub use crate::core::context::{current_id, interrupted, ContextId, ThreadHandle};
pub use crate::core::errors::{SyncError, SyncResult};
pub use crate::core::sync::{set_default_config, StrategyType, SyncConfig};
pub use locks::{
    CountDownLatch, CyclicBarrier, Exchanger, Lock, LockGuard, Mutex, ReentrantMutex, RwLock,
    Semaphore,
};
pub use monitoring::init_tracing;
pub use synchronizer::{AcquirePolicy, AtomicState, Condition, SyncCore, Synchronizer};
