/*!
 * Parking Primitives
 *
 * Block/wake primitives that back every waiter in the wait queue:
 * - Futex-based (Linux) for minimal overhead
 * - Condvar-based (cross-platform) for reliability
 * - Adaptive spinwait for low-latency scenarios
 *
 * # Architecture
 *
 * Each thread of control owns exactly one `ThreadParker`, created from the
 * process-wide `SyncConfig` when its handle is first materialized. The parker
 * carries a one-shot permit, so wakes that arrive before the thread blocks are
 * retained.
 *
 * # Performance
 *
 * - Enum dispatch, no virtual calls on park/unpark
 * - Lock-free permit handling for the futex strategy
 * - Cache-line aligned to prevent false sharing
 */

mod condvar;
mod config;
mod futex;
mod parker;
mod spinwait;
mod traits;

pub use config::{default_config, set_default_config, StrategyType, SyncConfig};
pub use parker::ThreadParker;
pub use traits::{ParkResult, Parker};

// Re-export specific strategies for advanced users
pub use condvar::CondvarParker;
pub use futex::FutexParker;
pub use spinwait::SpinParker;
