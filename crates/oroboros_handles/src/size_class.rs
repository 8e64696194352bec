//! # Size Classes
//!
//! Every handle allocator serves three fixed object sizes `P0 < P1 < P2`.
//! The class of a type is picked at compile time from `size_of::<T>()`;
//! types that fit no class fail to compile when first allocated.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use crate::memory::SLOT_ALIGNMENT;

/// One of the three pools of an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeClass {
    /// Objects up to `P0` bytes.
    Small,
    /// Objects up to `P1` bytes.
    Medium,
    /// Objects up to `P2` bytes.
    Large,
}

impl SizeClass {
    /// All classes, smallest first.
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Position of this class in per-class arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }

    /// Picks the smallest class that holds `size` bytes.
    ///
    /// Returns `None` if `size > p2`.
    #[inline]
    #[must_use]
    pub const fn for_size(size: usize, p0: usize, p1: usize, p2: usize) -> Option<Self> {
        if size <= p0 {
            Some(Self::Small)
        } else if size <= p1 {
            Some(Self::Medium)
        } else if size <= p2 {
            Some(Self::Large)
        } else {
            None
        }
    }
}

/// Slot stride for objects up to `size` bytes: `size` rounded up to the
/// slot alignment.
#[inline]
#[must_use]
pub const fn slot_stride(size: usize) -> usize {
    let size = if size == 0 { 1 } else { size };
    (size + SLOT_ALIGNMENT - 1) & !(SLOT_ALIGNMENT - 1)
}

/// Compile-time size class of `T` for buckets `P0`, `P1`, `P2`.
pub(crate) struct ClassOf<T, const P0: usize, const P1: usize, const P2: usize>(PhantomData<T>);

impl<T, const P0: usize, const P1: usize, const P2: usize> ClassOf<T, P0, P1, P2> {
    /// Size class of `T`. Evaluating it fails the build for oversized or
    /// over-aligned types.
    pub(crate) const CLASS: SizeClass = {
        assert!(
            align_of::<T>() <= SLOT_ALIGNMENT,
            "type alignment exceeds the handle slot alignment"
        );
        match SizeClass::for_size(size_of::<T>(), P0, P1, P2) {
            Some(class) => class,
            None => panic!("type is too large for every handle size class"),
        }
    };
}
