//! # Handle IDs
//!
//! A handle ID is a single `u32` split into:
//! - bit 31: heap flag (set for overflow-heap handles)
//! - bits 30..27: slot age for pool handles (zero for heap handles)
//! - bits 26..0: slot index for pool handles
//!
//! Heap handles use bits 30..0 as a monotonically increasing counter.
//!
//! ```text
//!  31  30    27 26                          0
//! ┌───┬────────┬─────────────────────────────┐
//! │ H │  AGE   │           INDEX             │
//! └───┴────────┴─────────────────────────────┘
//!          └─┘ debug tag key bits (28..27)
//! ```

use std::fmt;

/// Set for handles allocated from the overflow heap.
pub const HEAP_FLAG: u32 = 0x8000_0000;

/// Age bits of a pool handle.
pub const AGE_MASK: u32 = 0x7800_0000;

/// Shift of the age field.
pub const AGE_SHIFT: u32 = 27;

/// Age bits kept in the debug tag key of a pool handle.
pub const DEBUG_TAG_MASK: u32 = 0x1800_0000;

/// Index bits of a pool handle.
pub const INDEX_MASK: u32 = 0x07FF_FFFF;

/// Index bits of a heap handle.
pub const HEAP_INDEX_MASK: u32 = !HEAP_FLAG;

/// Number of distinct slot ages before wrapping.
pub const AGE_COUNT: u8 = 16;

/// Largest index a pool handle can address.
pub const MAX_POOL_INDEX: u32 = INDEX_MASK;

/// Largest index a heap handle can carry. `HEAP_INDEX_MASK` itself would
/// encode the null handle.
pub const MAX_HEAP_INDEX: u32 = HEAP_INDEX_MASK - 1;

/// Opaque 32-bit handle identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HandleId(u32);

impl HandleId {
    /// The null handle. Never issued by an allocator.
    pub const NULL: Self = Self(u32::MAX);

    /// Encodes a pool handle.
    ///
    /// # Arguments
    ///
    /// * `index` - Arena index (byte offset / slot alignment), at most 27 bits
    /// * `age` - Slot age, 0-15
    ///
    /// Out-of-range values trip a debug assertion and are masked in release.
    #[inline]
    #[must_use]
    pub const fn pool(index: u32, age: u8) -> Self {
        debug_assert!(index <= INDEX_MASK, "pool index out of range");
        debug_assert!(age < AGE_COUNT, "slot age out of range");
        let id = (((age as u32) << AGE_SHIFT) & AGE_MASK) | (index & INDEX_MASK);
        debug_assert!(id & HEAP_FLAG == 0);
        Self(id)
    }

    /// Encodes a heap handle around a counter value.
    #[inline]
    #[must_use]
    pub const fn heap(index: u32) -> Self {
        debug_assert!(index <= MAX_HEAP_INDEX, "heap index out of range");
        Self(HEAP_FLAG | (index & HEAP_INDEX_MASK))
    }

    /// Wraps a raw ID value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw ID value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    /// Checks if this handle lives in the arena pools.
    #[inline]
    #[must_use]
    pub const fn is_pool(self) -> bool {
        self.0 & HEAP_FLAG == 0
    }

    /// Checks if this handle lives in the overflow heap.
    #[inline]
    #[must_use]
    pub const fn is_heap(self) -> bool {
        !self.is_pool()
    }

    /// Returns the index portion: arena index for pool handles, counter
    /// value for heap handles.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        if self.is_pool() {
            self.0 & INDEX_MASK
        } else {
            self.0 & HEAP_INDEX_MASK
        }
    }

    /// Returns the slot age embedded in a pool handle.
    #[inline]
    #[must_use]
    pub const fn age(self) -> u8 {
        ((self.0 & AGE_MASK) >> AGE_SHIFT) as u8
    }

    /// Splits a pool handle into `(index, age)`.
    #[inline]
    #[must_use]
    pub const fn decode_pool(self) -> (u32, u8) {
        (self.0 & INDEX_MASK, self.age())
    }

    /// Key under which debug tags for this handle are stored.
    ///
    /// Pool handles drop the age bits outside [`DEBUG_TAG_MASK`], so handles
    /// reusing a slot at ages `k` and `k + 4` share a tag on purpose.
    #[inline]
    #[must_use]
    pub const fn tag_key(self) -> u32 {
        if self.is_pool() {
            self.0 & (DEBUG_TAG_MASK | INDEX_MASK)
        } else {
            self.0
        }
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("HandleId(null)")
        } else if self.is_pool() {
            write!(f, "HandleId(pool {} age {})", self.index(), self.age())
        } else {
            write!(f, "HandleId(heap {})", self.index())
        }
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
