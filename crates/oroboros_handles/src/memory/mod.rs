//! # Memory Management
//!
//! Backing storage for handle allocations.
//!
//! ## Design Philosophy
//!
//! The arena is allocated once at startup. During a frame:
//! - Pool allocations never touch the system heap
//! - Alloc/free bookkeeping is serialized by one mutex
//! - Handle resolution is lock-free (one atomic age load)
//!
//! When a size class runs dry, allocations spill to the overflow heap.

mod arena;
mod overflow;
mod pool;

pub(crate) use arena::{AgeMismatch, Arena};
pub(crate) use overflow::OverflowHeap;

/// Alignment of every pool slot, and the unit of pool handle indices.
pub const SLOT_ALIGNMENT: usize = 16;

/// Largest arena a 27-bit pool index can address.
pub const MAX_ARENA_BYTES: usize =
    (crate::handle::id::MAX_POOL_INDEX as usize + 1) * SLOT_ALIGNMENT;
