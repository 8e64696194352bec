//! # Allocator Statistics
//!
//! Point-in-time usage snapshots, used to size arenas for a workload.

/// Usage of one size class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slot stride in bytes.
    pub slot_size: usize,
    /// Total slots.
    pub capacity: usize,
    /// Slots currently allocated.
    pub in_use: usize,
    /// Most slots ever allocated at once.
    pub high_watermark: usize,
}

impl PoolStats {
    /// Fraction of the pool at its high watermark (0.0 for an empty pool).
    #[must_use]
    pub fn peak_utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.high_watermark as f64 / self.capacity as f64
        }
    }
}

/// Usage of a whole handle allocator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocatorStats {
    /// Bytes of the arena carved into pools.
    pub arena_bytes: usize,
    /// Per size class, smallest first.
    pub pools: [PoolStats; 3],
    /// Live overflow-heap handles.
    pub heap_live: usize,
    /// Overflow-heap handles ever issued.
    pub heap_issued: u32,
    /// Whether the heap fallback warning has been logged.
    pub heap_fallback_warned: bool,
}

impl AllocatorStats {
    /// Live pool handles across all size classes.
    #[must_use]
    pub fn pool_live(&self) -> usize {
        self.pools.iter().map(|p| p.in_use).sum()
    }

    /// All live handles.
    #[must_use]
    pub fn live(&self) -> usize {
        self.pool_live() + self.heap_live
    }
}
