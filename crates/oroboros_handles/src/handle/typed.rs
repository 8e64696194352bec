//! # Typed Handles
//!
//! `Handle<T>` is a `HandleId` that remembers which type was allocated
//! behind it. The type parameter is a compile-time tag only; handles are
//! always `Copy + Send + Sync`, whatever `T` is.

#![allow(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::id::HandleId;

/// A typed handle to an object owned by a handle allocator.
///
/// # Example
///
/// ```rust,ignore
/// let handle: Handle<GlBuffer> = allocator.allocate_and_construct(GlBuffer::new(64));
/// let buffer = allocator.cast::<GlBuffer, _>(handle);
/// ```
#[repr(transparent)]
pub struct Handle<T> {
    id: HandleId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Null handle.
    pub const NULL: Self = Self::from_id(HandleId::NULL);

    /// Wraps an untyped ID.
    #[inline]
    #[must_use]
    pub const fn from_id(id: HandleId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped ID.
    #[inline]
    #[must_use]
    pub const fn id(self) -> HandleId {
        self.id
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.id.is_null()
    }

    /// Resets this handle to null.
    #[inline]
    pub fn clear(&mut self) {
        self.id = HandleId::NULL;
    }

    /// Reinterprets the handle as a handle to a base type.
    #[inline]
    #[must_use]
    pub const fn upcast<B>(self) -> Handle<B>
    where
        T: Extends<B>,
    {
        Handle::from_id(self.id)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({:?})", std::any::type_name::<T>(), self.id)
    }
}

impl<T> From<Handle<T>> for HandleId {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}

/// Marks `Self` as a subtype of `B` for handle casts.
///
/// A backend declares its concrete resource (say `GlTexture`) as extending
/// the API-facing type (`HwTexture`), then constructs and casts concrete
/// objects through `Handle<HwTexture>`.
///
/// # Safety
///
/// A pointer to `Self` must be valid to read as a pointer to `B`. In
/// practice `Self` is `#[repr(C)]` with a `B` as its first field, or is `B`.
pub unsafe trait Extends<B> {}

// SAFETY: a pointer to `T` is trivially a pointer to `T`.
unsafe impl<T> Extends<T> for T {}
