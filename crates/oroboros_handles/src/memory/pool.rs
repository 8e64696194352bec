//! # Slot Pool
//!
//! Fixed-stride free-list bookkeeping for one size class of the arena.

use crate::stats::PoolStats;

/// Free-list allocator over a sub-range of the arena.
///
/// The pool never touches memory itself: it hands out arena indices (byte
/// offset / slot alignment) of slots in its sub-range. The owning
/// [`Arena`](super::Arena) serializes access.
///
/// Freed slots are reused last-in first-out, so a slot freed and allocated
/// again in the same size class comes back immediately.
pub(crate) struct SlotPool {
    /// Arena index of the first slot.
    first_index: u32,
    /// Distance between two slots, in arena indices.
    stride: u32,
    /// Free list - slot numbers of available slots.
    free_list: Vec<u32>,
    /// Number of allocated slots.
    allocated_count: usize,
    /// Most slots ever allocated at once.
    high_watermark: usize,
    /// Total capacity.
    capacity: usize,
}

impl SlotPool {
    /// Creates a pool of `capacity` slots starting at `first_index`.
    ///
    /// # Arguments
    ///
    /// * `first_index` - Arena index of slot 0
    /// * `stride` - Slot stride in arena indices
    /// * `capacity` - Number of slots
    pub(crate) fn new(first_index: u32, stride: u32, capacity: usize) -> Self {
        assert!(stride > 0, "Stride must be greater than zero");
        let slots = u32::try_from(capacity).expect("pool capacity exceeds u32");

        // Reversed so the lowest slot is handed out first.
        let free_list: Vec<u32> = (0..slots).rev().collect();

        Self {
            first_index,
            stride,
            free_list,
            allocated_count: 0,
            high_watermark: 0,
            capacity,
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently allocated slots.
    #[inline]
    pub(crate) const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns the number of free slots.
    #[inline]
    pub(crate) fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Checks if `index` is the start of a slot in this pool.
    #[inline]
    pub(crate) fn owns(&self, index: u32) -> bool {
        let Some(offset) = index.checked_sub(self.first_index) else {
            return false;
        };
        offset % self.stride == 0 && ((offset / self.stride) as usize) < self.capacity
    }

    /// Pops a free slot, returning its arena index.
    ///
    /// Returns `None` when the pool is exhausted.
    pub(crate) fn allocate(&mut self) -> Option<u32> {
        let slot = self.free_list.pop()?;
        self.allocated_count += 1;
        self.high_watermark = self.high_watermark.max(self.allocated_count);
        Some(self.first_index + slot * self.stride)
    }

    /// Returns the slot at arena index `index` to the free list.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a slot of this pool.
    pub(crate) fn free(&mut self, index: u32) {
        assert!(self.owns(index), "arena index {index} does not belong to this pool");
        debug_assert!(self.allocated_count > 0, "free on an empty pool");
        self.free_list.push((index - self.first_index) / self.stride);
        self.allocated_count = self.allocated_count.saturating_sub(1);
    }

    /// Snapshot of this pool's usage.
    pub(crate) fn stats(&self, slot_size: usize) -> PoolStats {
        PoolStats {
            slot_size,
            capacity: self.capacity,
            in_use: self.allocated_count,
            high_watermark: self.high_watermark,
        }
    }
}
