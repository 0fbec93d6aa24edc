/*!
 * System Limits and Constants
 *
 * Centralized location for synchronizer limits, thresholds, and magic numbers.
 *
 * ## Design Philosophy
 * - Values are grouped by domain (arena, parking, locks)
 * - Performance-critical constants are marked with [PERF]
 */

use std::time::Duration;

// =============================================================================
// WAITER ARENA
// =============================================================================

/// Slots in the first arena segment
/// Segment `k` holds `ARENA_BASE_SEGMENT << k` slots, so small synchronizers
/// never allocate more than one segment.
pub const ARENA_BASE_SEGMENT: usize = 16;

/// Number of arena segments
/// Total capacity is `ARENA_BASE_SEGMENT * (2^ARENA_SEGMENTS - 1)` slots (~268M)
pub const ARENA_SEGMENTS: usize = 24;

// =============================================================================
// PARKING
// =============================================================================

/// Default spin duration before a spinning parker falls back to blocking
/// [PERF] Covers a typical uncontended critical section hand-off
pub const DEFAULT_SPIN_DURATION: Duration = Duration::from_micros(10);

/// Default maximum spin iterations before blocking
pub const DEFAULT_MAX_SPINS: u32 = 100;

/// Yield to the OS scheduler every N spin iterations
pub const SPIN_YIELD_INTERVAL: u32 = 10;

// =============================================================================
// LOCK LIMITS
// =============================================================================

/// Maximum reentrant hold count for a single owner
pub const MAX_HOLD_COUNT: i64 = i64::MAX;

/// Bit shift separating read holds (upper half) from write holds (lower half)
pub const RW_SHARED_SHIFT: u32 = 32;

/// Maximum read or write holds for the read/write lock
pub const RW_MAX_COUNT: i64 = (1 << 31) - 1;
