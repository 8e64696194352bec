//! # Handle Arena
//!
//! One contiguous, zeroed region carved into three pools that all hold the
//! same number of slots.
//!
//! ## Safety Note
//!
//! This module owns raw memory and hands out addresses inside it. All
//! pointer arithmetic is bounds-checked against the age table.
//!
//! ## Layout
//!
//! ```text
//!  base
//!   │
//!   ▼
//!   ┌──────────────────┬───────────────────────┬──────────────────────────┐
//!   │ small: count × S0│  medium: count × S1   │    large: count × S2     │
//!   └──────────────────┴───────────────────────┴──────────────────────────┘
//!   ages: one AtomicU8 per 16-byte unit, indexed by pool handle index
//! ```
//!
//! Because every slot starts on a 16-byte boundary, `base + index * 16` is
//! the slot address and `ages[index]` its age. The size class is only needed
//! to pick a free list.

#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use super::pool::SlotPool;
use super::{MAX_ARENA_BYTES, SLOT_ALIGNMENT};
use crate::handle::id::AGE_COUNT;
use crate::size_class::SizeClass;
use crate::stats::PoolStats;

/// A slot's stored age did not match the age the caller expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AgeMismatch {
    /// Age the caller's handle carries.
    pub expected: u8,
    /// Age found in the slot.
    pub stored: u8,
}

/// Pooled backing storage for handles.
///
/// # Thread Safety
///
/// Alloc/free are serialized by an internal mutex. Age reads are atomic and
/// lock-free.
pub(crate) struct Arena {
    /// Start of the backing region.
    base: NonNull<u8>,
    /// Layout the region was allocated with.
    layout: Layout,
    /// Slot ages, one per `SLOT_ALIGNMENT` bytes of the used region.
    ages: Box<[AtomicU8]>,
    /// Byte stride of each size class.
    strides: [usize; 3],
    /// Slots per size class.
    slot_count: usize,
    /// First arena index of each class, then one past the last index.
    bounds: [u32; 4],
    /// Free lists, one per size class.
    pools: Mutex<[SlotPool; 3]>,
}

// SAFETY: the region is owned by the arena and only freed on drop. Pool
// bookkeeping is behind a mutex and ages are atomics.
unsafe impl Send for Arena {}
// SAFETY: see above; `&Arena` only exposes synchronized state.
unsafe impl Sync for Arena {}

impl Arena {
    /// Creates an arena of at most `size_bytes` bytes.
    ///
    /// # Arguments
    ///
    /// * `size_bytes` - Size of the backing region
    /// * `strides` - Slot stride of each size class, multiples of 16
    ///
    /// # Panics
    ///
    /// Panics if a stride is not a non-zero multiple of the slot alignment,
    /// or if the arena cannot be addressed by a pool handle index.
    pub(crate) fn new(size_bytes: usize, strides: [usize; 3]) -> Self {
        assert!(
            strides.iter().all(|&s| s > 0 && s % SLOT_ALIGNMENT == 0),
            "slot strides must be non-zero multiples of {SLOT_ALIGNMENT}"
        );
        assert!(size_bytes <= MAX_ARENA_BYTES, "arena too large for 27-bit indices");

        let row: usize = strides.iter().sum();
        let slot_count = size_bytes / row;
        let used_bytes = slot_count * row;

        let layout =
            Layout::from_size_align(used_bytes.max(1), SLOT_ALIGNMENT).expect("Invalid layout");

        // SAFETY: layout has non-zero size.
        let base = unsafe {
            let ptr = alloc_zeroed(layout);
            match NonNull::new(ptr) {
                Some(ptr) => ptr,
                None => handle_alloc_error(layout),
            }
        };

        let ages: Box<[AtomicU8]> = (0..used_bytes / SLOT_ALIGNMENT)
            .map(|_| AtomicU8::new(0))
            .collect();

        let mut bounds = [0u32; 4];
        let mut first_index = 0u32;
        let pools = SizeClass::ALL.map(|class| {
            let stride_units = (strides[class.index()] / SLOT_ALIGNMENT) as u32;
            let pool = SlotPool::new(first_index, stride_units, slot_count);
            first_index += stride_units * slot_count as u32;
            bounds[class.index() + 1] = first_index;
            pool
        });

        Self {
            base,
            layout,
            ages,
            strides,
            slot_count,
            bounds,
            pools: Mutex::new(pools),
        }
    }

    /// Number of slots in each size class.
    #[inline]
    pub(crate) const fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Bytes of the backing region in use by the pools.
    #[inline]
    pub(crate) fn used_bytes(&self) -> usize {
        self.ages.len() * SLOT_ALIGNMENT
    }

    /// Byte stride of a size class.
    #[inline]
    pub(crate) const fn stride(&self, class: SizeClass) -> usize {
        self.strides[class.index()]
    }

    /// Size class of the slot starting at `index`.
    ///
    /// Returns `None` past the arena end or for an index inside a slot.
    #[inline]
    pub(crate) fn class_of(&self, index: u32) -> Option<SizeClass> {
        let class = SizeClass::ALL
            .into_iter()
            .find(|class| index < self.bounds[class.index() + 1])?;
        let offset = (index - self.bounds[class.index()]) as usize;
        (offset % (self.stride(class) / SLOT_ALIGNMENT) == 0).then_some(class)
    }

    /// Takes a slot from `class`, returning its index and current age.
    ///
    /// Returns `None` if the class is exhausted.
    pub(crate) fn alloc(&self, class: SizeClass) -> Option<(u32, u8)> {
        let index = self.pools.lock()[class.index()].allocate()?;
        let age = self.ages[index as usize].load(Ordering::Relaxed);
        Some((index, age))
    }

    /// Returns a slot to `class`, advancing its age.
    ///
    /// With `checked`, a slot whose stored age differs from `expected_age`
    /// is left untouched and reported as a mismatch.
    pub(crate) fn free(
        &self,
        index: u32,
        class: SizeClass,
        expected_age: u8,
        checked: bool,
    ) -> Result<(), AgeMismatch> {
        let mut pools = self.pools.lock();
        let age = &self.ages[index as usize];
        let stored = age.load(Ordering::Relaxed);
        if checked && stored != expected_age {
            return Err(AgeMismatch {
                expected: expected_age,
                stored,
            });
        }
        age.store((stored + 1) % AGE_COUNT, Ordering::Relaxed);

        let pool = &mut pools[class.index()];
        pool.free(index);
        debug_assert_eq!(pool.free_count() + pool.allocated_count(), pool.capacity());
        Ok(())
    }

    /// Current age of the slot at `index`, or `None` past the arena end.
    #[inline]
    pub(crate) fn age(&self, index: u32) -> Option<u8> {
        self.ages.get(index as usize).map(|age| age.load(Ordering::Relaxed))
    }

    /// Address of the slot at `index`, or `None` past the arena end.
    #[inline]
    pub(crate) fn address(&self, index: u32) -> Option<NonNull<u8>> {
        if (index as usize) < self.ages.len() {
            // SAFETY: index < ages.len() keeps the offset inside the region,
            // and the offset of an in-bounds address is never null.
            Some(unsafe {
                NonNull::new_unchecked(self.base.as_ptr().add(index as usize * SLOT_ALIGNMENT))
            })
        } else {
            None
        }
    }

    /// Number of pool slots currently allocated across all classes.
    pub(crate) fn outstanding(&self) -> usize {
        self.pools.lock().iter().map(SlotPool::allocated_count).sum()
    }

    /// Usage snapshot per size class.
    pub(crate) fn stats(&self) -> [PoolStats; 3] {
        let pools = self.pools.lock();
        SizeClass::ALL.map(|class| pools[class.index()].stats(self.stride(class)))
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base` was allocated with `layout` in `new`.
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIDES: [usize; 3] = [32, 96, 192];

    #[test]
    fn test_arena_slices_equal_counts() {
        let arena = Arena::new(320 * 10 + 100, STRIDES);
        assert_eq!(arena.slot_count(), 10);
        assert_eq!(arena.used_bytes(), 3200);

        let stats = arena.stats();
        assert!(stats.iter().all(|s| s.capacity == 10));
        assert_eq!(stats[2].slot_size, 192);
    }

    #[test]
    fn test_first_slots_start_each_range() {
        let arena = Arena::new(320 * 4, STRIDES);
        assert_eq!(arena.alloc(SizeClass::Small), Some((0, 0)));
        assert_eq!(arena.alloc(SizeClass::Medium), Some((4 * 2, 0)));
        assert_eq!(arena.alloc(SizeClass::Large), Some((4 * 2 + 4 * 6, 0)));
    }

    #[test]
    fn test_class_of_follows_ranges() {
        let arena = Arena::new(320 * 4, STRIDES);
        assert_eq!(arena.class_of(0), Some(SizeClass::Small));
        assert_eq!(arena.class_of(6), Some(SizeClass::Small));
        assert_eq!(arena.class_of(7), None);
        assert_eq!(arena.class_of(8), Some(SizeClass::Medium));
        assert_eq!(arena.class_of(32), Some(SizeClass::Large));
        assert_eq!(arena.class_of(68), Some(SizeClass::Large));
        assert_eq!(arena.class_of(79), None);
        assert_eq!(arena.class_of(80), None);
    }

    #[test]
    fn test_free_advances_age() {
        let arena = Arena::new(320 * 2, STRIDES);
        let (index, age) = arena.alloc(SizeClass::Medium).unwrap();
        assert_eq!(age, 0);

        arena.free(index, SizeClass::Medium, 0, true).unwrap();
        assert_eq!(arena.age(index), Some(1));
        assert_eq!(arena.alloc(SizeClass::Medium), Some((index, 1)));
    }

    #[test]
    fn test_checked_free_rejects_stale_age() {
        let arena = Arena::new(320, STRIDES);
        let (index, _) = arena.alloc(SizeClass::Small).unwrap();
        arena.free(index, SizeClass::Small, 0, true).unwrap();

        let err = arena.free(index, SizeClass::Small, 0, true).unwrap_err();
        assert_eq!(err, AgeMismatch { expected: 0, stored: 1 });
        assert_eq!(arena.age(index), Some(1));

        // Free list intact: exactly one slot, handed out again.
        assert_eq!(arena.alloc(SizeClass::Small), Some((index, 1)));
        assert_eq!(arena.alloc(SizeClass::Small), None);
    }

    #[test]
    fn test_age_wraps_at_sixteen() {
        let arena = Arena::new(320, STRIDES);
        let mut seen = Vec::new();
        for _ in 0..18 {
            let (index, age) = arena.alloc(SizeClass::Large).unwrap();
            seen.push(age);
            arena.free(index, SizeClass::Large, age, true).unwrap();
        }
        let expected: Vec<u8> = (0..16).chain(0..2).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_addresses_are_aligned_and_bounded() {
        let arena = Arena::new(320 * 3, STRIDES);
        let last = (arena.used_bytes() / SLOT_ALIGNMENT - 1) as u32;
        let ptr = arena.address(last).unwrap();
        assert_eq!(ptr.as_ptr() as usize % SLOT_ALIGNMENT, 0);
        assert!(arena.address(last + 1).is_none());
        assert!(arena.age(last + 1).is_none());
    }

    #[test]
    fn test_empty_arena_allocates_nothing() {
        let arena = Arena::new(100, STRIDES);
        assert_eq!(arena.slot_count(), 0);
        assert_eq!(arena.alloc(SizeClass::Small), None);
        assert_eq!(arena.outstanding(), 0);
    }
}
