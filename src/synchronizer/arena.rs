/*!
 * Waiter Arena
 *
 * Slot storage for wait-queue nodes, addressed by generation-tagged indices.
 *
 * # Design
 *
 * Slots live in geometrically growing segments that are never freed while
 * the arena is alive, so a slot address stays valid for the arena's lifetime.
 * What a stale index can observe is bounded by its generation tag:
 * - Links are packed `(generation << 32) | index`, so a link CAS never
 *   matches a recycled slot
 * - The status word carries the generation in its upper half, so every
 *   foreign status CAS is generation-checked
 * - Reads through a stale reference report `CANCELLED` / no link
 *
 * Release bumps the generation. Retired slots are released through
 * `crossbeam-epoch`, so a slot reached while pinned keeps its generation until
 * the reader unpins.
 */

use crate::core::context::{ThreadHandle, ThreadInner};
use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::{ARENA_BASE_SEGMENT, ARENA_SEGMENTS};
use arc_swap::ArcSwapOption;
use crossbeam_epoch::Guard;
use crossbeam_queue::SegQueue;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

/// Packed representation of "no waiter"
pub(crate) const NIL: u64 = u64::MAX;

/// Generation-tagged slot index
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WaiterRef {
    index: u32,
    generation: u32,
}

impl WaiterRef {
    #[inline]
    pub(crate) fn pack(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub(crate) fn unpack(raw: u64) -> Option<Self> {
        (raw != NIL).then_some(Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        })
    }

    #[inline]
    pub(crate) fn pack_opt(r: Option<Self>) -> u64 {
        r.map_or(NIL, Self::pack)
    }
}

impl fmt::Debug for WaiterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Waiter status flags
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct WaitStatus(u32);

impl WaitStatus {
    pub(crate) const INITIAL: Self = Self(0);
    /// Armed: the owner will park, a waker must clear this and unpark
    pub(crate) const READY_TO_WAKE: Self = Self(1);
    pub(crate) const IN_CONDITION_QUEUE: Self = Self(2);
    /// Set on the head when a shared release found nobody to wake
    pub(crate) const SHARED_PROPAGATE: Self = Self(4);
    pub(crate) const CANCELLED: Self = Self(0x8000_0000);

    #[inline]
    pub(crate) fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub(crate) fn is_cancelled(self) -> bool {
        self.contains(Self::CANCELLED)
    }
}

impl std::ops::BitOr for WaitStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Initial");
        }
        let mut parts = Vec::new();
        if self.is_cancelled() {
            parts.push("Cancelled");
        }
        if self.contains(Self::READY_TO_WAKE) {
            parts.push("ReadyToWake");
        }
        if self.contains(Self::IN_CONDITION_QUEUE) {
            parts.push("InConditionQueue");
        }
        if self.contains(Self::SHARED_PROPAGATE) {
            parts.push("SharedPropagate");
        }
        f.write_str(&parts.join("|"))
    }
}

#[inline]
fn pack_status(generation: u32, status: WaitStatus) -> u64 {
    ((generation as u64) << 32) | status.bits() as u64
}

/// Waiter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum WaiterMode {
    Exclusive,
    Shared,
}

/// Packed link cell
struct Link(AtomicU64);

impl Link {
    const fn nil() -> Self {
        Self(AtomicU64::new(NIL))
    }

    #[inline]
    fn load(&self) -> Option<WaiterRef> {
        WaiterRef::unpack(self.0.load(Ordering::SeqCst))
    }

    #[inline]
    fn store(&self, r: Option<WaiterRef>) {
        self.0.store(WaiterRef::pack_opt(r), Ordering::SeqCst);
    }

    #[inline]
    fn cas(&self, current: Option<WaiterRef>, new: Option<WaiterRef>) -> bool {
        self.0
            .compare_exchange(
                WaiterRef::pack_opt(current),
                WaiterRef::pack_opt(new),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

#[repr(align(64))]
struct WaiterSlot {
    generation: AtomicU32,
    status: AtomicU64,
    prev: Link,
    next: Link,
    next_in_condition: Link,
    mode: AtomicU8,
    thread: ArcSwapOption<ThreadInner>,
}

impl WaiterSlot {
    fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            status: AtomicU64::new(pack_status(0, WaitStatus::CANCELLED)),
            prev: Link::nil(),
            next: Link::nil(),
            next_in_condition: Link::nil(),
            mode: AtomicU8::new(0),
            thread: ArcSwapOption::empty(),
        }
    }
}

/// Map a slot index to `(segment, offset)`
#[inline]
fn locate(index: u32) -> (usize, usize) {
    let j = index as usize + ARENA_BASE_SEGMENT;
    let segment = (usize::BITS - 1 - j.leading_zeros()) as usize - ARENA_BASE_SEGMENT.trailing_zeros() as usize;
    (segment, j - (ARENA_BASE_SEGMENT << segment))
}

/// Segmented slot arena with a lock-free free list
pub(crate) struct WaiterArena {
    segments: [OnceLock<Box<[WaiterSlot]>>; ARENA_SEGMENTS],
    next_fresh: AtomicU32,
    free: SegQueue<u32>,
}

impl WaiterArena {
    pub(crate) fn new() -> Self {
        Self {
            segments: std::array::from_fn(|_| OnceLock::new()),
            next_fresh: AtomicU32::new(0),
            free: SegQueue::new(),
        }
    }

    fn capacity() -> usize {
        ARENA_BASE_SEGMENT * ((1usize << ARENA_SEGMENTS) - 1)
    }

    /// Slot for an index that was handed out by this arena
    #[inline]
    fn slot(&self, index: u32) -> Option<&WaiterSlot> {
        let (segment, offset) = locate(index);
        self.segments.get(segment)?.get()?.get(offset)
    }

    /// Slot for a reference, `None` once the reference is stale
    #[inline]
    fn live(&self, r: WaiterRef) -> Option<&WaiterSlot> {
        self.slot(r.index)
            .filter(|s| s.generation.load(Ordering::SeqCst) == r.generation)
    }

    fn fresh_index(&self) -> SyncResult<u32> {
        let index = self.next_fresh.fetch_add(1, Ordering::Relaxed);
        if index as usize >= Self::capacity() {
            self.next_fresh.fetch_sub(1, Ordering::Relaxed);
            return Err(SyncError::CapacityExhausted);
        }
        let (segment, _) = locate(index);
        self.segments[segment].get_or_init(|| {
            (0..(ARENA_BASE_SEGMENT << segment))
                .map(|_| WaiterSlot::new())
                .collect()
        });
        Ok(index)
    }

    /// Take a slot and initialize it for `thread`
    pub(crate) fn allocate(
        &self,
        mode: WaiterMode,
        thread: Option<&ThreadHandle>,
        status: WaitStatus,
    ) -> SyncResult<WaiterRef> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.fresh_index()?,
        };
        let slot = self.slot(index).ok_or(SyncError::CapacityExhausted)?;
        let generation = slot.generation.load(Ordering::SeqCst);

        slot.prev.store(None);
        slot.next.store(None);
        slot.next_in_condition.store(None);
        slot.mode.store(mode as u8, Ordering::Relaxed);
        slot.thread.store(thread.map(|t| t.inner().clone()));
        slot.status.store(pack_status(generation, status), Ordering::SeqCst);

        Ok(WaiterRef { index, generation })
    }

    /// Return a slot to the free list; idempotent per generation
    pub(crate) fn release(&self, r: WaiterRef) {
        let Some(slot) = self.slot(r.index) else {
            return;
        };
        let next_gen = r.generation.wrapping_add(1);
        if slot
            .generation
            .compare_exchange(r.generation, next_gen, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        slot.status
            .store(pack_status(next_gen, WaitStatus::CANCELLED), Ordering::SeqCst);
        slot.thread.store(None);
        self.free.push(r.index);
    }

    /// Release `r` once every currently pinned reader has unpinned
    pub(crate) fn retire(self: &Arc<Self>, r: WaiterRef, guard: &Guard) {
        let arena = Arc::clone(self);
        guard.defer(move || arena.release(r));
    }

    // =========================================================================
    // Field access
    // =========================================================================

    #[inline]
    pub(crate) fn status(&self, r: WaiterRef) -> WaitStatus {
        match self.slot(r.index) {
            Some(slot) => {
                let word = slot.status.load(Ordering::SeqCst);
                if (word >> 32) as u32 == r.generation {
                    WaitStatus(word as u32)
                } else {
                    WaitStatus::CANCELLED
                }
            }
            None => WaitStatus::CANCELLED,
        }
    }

    /// Owner-only store of the status flags
    #[inline]
    pub(crate) fn set_status(&self, r: WaiterRef, status: WaitStatus) {
        if let Some(slot) = self.slot(r.index) {
            let _ = slot.status.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                ((word >> 32) as u32 == r.generation).then(|| pack_status(r.generation, status))
            });
        }
    }

    /// Generation-checked CAS of the status flags
    pub(crate) fn cas_status(&self, r: WaiterRef, current: WaitStatus, new: WaitStatus) -> bool {
        self.slot(r.index).is_some_and(|slot| {
            slot.status
                .compare_exchange(
                    pack_status(r.generation, current),
                    pack_status(r.generation, new),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        })
    }

    /// Clear `flags`, returning the previous status (`CANCELLED` if stale)
    pub(crate) fn fetch_unset(&self, r: WaiterRef, flags: WaitStatus) -> WaitStatus {
        let Some(slot) = self.slot(r.index) else {
            return WaitStatus::CANCELLED;
        };
        match slot.status.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
            ((word >> 32) as u32 == r.generation).then_some(word & !(flags.bits() as u64))
        }) {
            Ok(previous) => WaitStatus(previous as u32),
            Err(_) => WaitStatus::CANCELLED,
        }
    }

    #[inline]
    pub(crate) fn prev(&self, r: WaiterRef) -> Option<WaiterRef> {
        let slot = self.slot(r.index)?;
        let value = slot.prev.load();
        self.live(r).and(value)
    }

    #[inline]
    pub(crate) fn next(&self, r: WaiterRef) -> Option<WaiterRef> {
        let slot = self.slot(r.index)?;
        let value = slot.next.load();
        self.live(r).and(value)
    }

    #[inline]
    pub(crate) fn next_in_condition(&self, r: WaiterRef) -> Option<WaiterRef> {
        let slot = self.slot(r.index)?;
        let value = slot.next_in_condition.load();
        self.live(r).and(value)
    }

    #[inline]
    pub(crate) fn set_prev(&self, r: WaiterRef, value: Option<WaiterRef>) {
        if let Some(slot) = self.live(r) {
            slot.prev.store(value);
        }
    }

    #[inline]
    pub(crate) fn set_next(&self, r: WaiterRef, value: Option<WaiterRef>) {
        if let Some(slot) = self.live(r) {
            slot.next.store(value);
        }
    }

    #[inline]
    pub(crate) fn cas_next(&self, r: WaiterRef, current: Option<WaiterRef>, new: Option<WaiterRef>) -> bool {
        self.live(r).is_some_and(|slot| slot.next.cas(current, new))
    }

    #[inline]
    pub(crate) fn set_next_in_condition(&self, r: WaiterRef, value: Option<WaiterRef>) {
        if let Some(slot) = self.live(r) {
            slot.next_in_condition.store(value);
        }
    }

    pub(crate) fn mode(&self, r: WaiterRef) -> Option<WaiterMode> {
        let slot = self.live(r)?;
        Some(if slot.mode.load(Ordering::Relaxed) == WaiterMode::Shared as u8 {
            WaiterMode::Shared
        } else {
            WaiterMode::Exclusive
        })
    }

    pub(crate) fn thread(&self, r: WaiterRef) -> Option<Arc<ThreadInner>> {
        let slot = self.slot(r.index)?;
        let thread = slot.thread.load_full();
        self.live(r).and(thread)
    }

    pub(crate) fn clear_thread(&self, r: WaiterRef) {
        if let Some(slot) = self.live(r) {
            slot.thread.store(None);
        }
    }

    /// Slots handed out so far (live or free)
    #[cfg(test)]
    pub(crate) fn high_water(&self) -> u32 {
        self.next_fresh.load(Ordering::Relaxed)
    }
}
