//! # Handle Allocator
//!
//! The facade collaborators use to create, resolve and destroy
//! GPU-resource proxy objects through 32-bit handles.
//!
//! ## Safety Note
//!
//! Objects are constructed in place inside the arena (or an overflow heap
//! block). Construction and destruction through a handle are `unsafe fn`s:
//! the allocator validates the handle protocol, the caller vouches for the
//! type living in the slot.
//!
//! ## Protocol
//!
//! ```text
//!  allocate ──► Allocated ──construct──► Constructed ──deallocate──► Freed
//!                   │                                                  │
//!                   └──────────── deallocate_storage ──────────────────┤
//!                                                                      ▼
//!                                             slot reused with age + 1 (mod 16)
//! ```
//!
//! A pool handle is live while its embedded age equals the slot's stored
//! age. A heap handle is live while it is in the overflow map.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::config::HandleAllocatorConfig;
use crate::error::{fatal, HandleError, HandleResult, Operation};
use crate::handle::{Extends, Handle, HandleId};
use crate::memory::{AgeMismatch, Arena, OverflowHeap, SLOT_ALIGNMENT};
use crate::size_class::{slot_stride, ClassOf, SizeClass};
use crate::stats::AllocatorStats;
use crate::tags::TagRegistry;

/// Handle allocator sized for the OpenGL backend's proxy objects.
pub type DefaultHandleAllocator = HandleAllocator<32, 96, 184>;

/// Why a handle failed to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Miss {
    /// The null handle.
    Null,
    /// Pool index past the end of the arena or inside a slot.
    OutOfRange,
    /// Pool slot age differs from the handle's age.
    Stale { expected: u8, stored: u8 },
    /// Heap index issued once, no longer live.
    Freed,
    /// Heap index never issued.
    NeverIssued,
}

/// Typed handle allocator over a tiered arena with heap fallback.
///
/// `P0 < P1 < P2` are the three object size classes in bytes. Objects are
/// placed in the smallest class that holds them; a type larger than `P2`
/// fails to compile when allocated.
///
/// # Thread Safety
///
/// All methods take `&self`. Allocation and release serialize on the arena
/// mutex; resolving a pool handle is lock-free.
///
/// # Example
///
/// ```rust,ignore
/// let handles = DefaultHandleAllocator::new(HandleAllocatorConfig::new("gl", 4 << 20))?;
///
/// let buffer = handles.allocate_and_construct(GlBuffer { id: 7, size: 256 });
/// handles.associate_tag(buffer.id(), "camera-ubo");
///
/// let ptr = handles.cast::<GlBuffer, _>(buffer);
/// unsafe { handles.destroy(buffer) };
/// ```
pub struct HandleAllocator<const P0: usize, const P1: usize, const P2: usize> {
    /// Settings the allocator was built with.
    config: HandleAllocatorConfig,
    /// Pooled storage.
    arena: Arena,
    /// Fallback storage once a class is exhausted.
    heap: OverflowHeap,
    /// Heap block layout per size class.
    heap_layouts: [Layout; 3],
    /// Debug tags.
    tags: TagRegistry,
    /// Whether pool ages are compared on resolve and free.
    check_ages: bool,
}

impl<const P0: usize, const P1: usize, const P2: usize> HandleAllocator<P0, P1, P2> {
    /// Evaluating this fails the build for unordered size classes.
    const VALID_CLASSES: () = assert!(
        0 < P0 && P0 < P1 && P1 < P2,
        "handle size classes must satisfy 0 < P0 < P1 < P2"
    );

    /// Slot stride of each size class in bytes.
    pub const STRIDES: [usize; 3] = [slot_stride(P0), slot_stride(P1), slot_stride(P2)];

    /// Creates an allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: HandleAllocatorConfig) -> HandleResult<Self> {
        let () = Self::VALID_CLASSES;
        config.validate()?;

        let mut heap_layouts = [Layout::new::<u8>(); 3];
        for (layout, stride) in heap_layouts.iter_mut().zip(Self::STRIDES) {
            *layout = Layout::from_size_align(stride, SLOT_ALIGNMENT)
                .map_err(|e| HandleError::InvalidConfig(e.to_string()))?;
        }

        let arena = Arena::new(config.arena_size_bytes, Self::STRIDES);
        tracing::debug!(
            allocator = %config.name,
            arena_bytes = arena.used_bytes(),
            slots_per_class = arena.slot_count(),
            "handle arena ready"
        );

        Ok(Self {
            heap: OverflowHeap::new(&config.name),
            heap_layouts,
            tags: TagRegistry::new(!config.disable_heap_handle_tags),
            check_ages: !config.disable_use_after_free_check,
            arena,
            config,
        })
    }

    /// Creates an allocator with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the arena size is not addressable.
    pub fn with_arena_size(name: &str, arena_size_bytes: usize) -> HandleResult<Self> {
        Self::new(HandleAllocatorConfig::new(name, arena_size_bytes))
    }

    /// Diagnostic name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Settings this allocator was created with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HandleAllocatorConfig {
        &self.config
    }

    /// Number of slots in each size class of the arena.
    #[inline]
    #[must_use]
    pub fn slots_per_class(&self) -> usize {
        self.arena.slot_count()
    }

    /// Size class objects of type `T` are allocated in.
    #[inline]
    #[must_use]
    pub const fn size_class_of<T>() -> SizeClass {
        ClassOf::<T, P0, P1, P2>::CLASS
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocates storage for a `T` without constructing it.
    ///
    /// The handle must be constructed into with [`construct`](Self::construct)
    /// or released with [`deallocate_storage`](Self::deallocate_storage).
    #[must_use]
    pub fn allocate<T>(&self) -> Handle<T> {
        Handle::from_id(self.allocate_in(Self::size_class_of::<T>()))
    }

    /// Allocates storage sized for a `D` and returns it as a handle to its
    /// base type `B`.
    #[must_use]
    pub fn allocate_as<D: Extends<B>, B>(&self) -> Handle<B> {
        Handle::from_id(self.allocate_in(Self::size_class_of::<D>()))
    }

    /// Allocates a handle and moves `value` into it.
    pub fn allocate_and_construct<T>(&self, value: T) -> Handle<T> {
        let handle = self.allocate::<T>();
        let ptr = self.expect_fresh(handle.id());
        // SAFETY: the slot was just issued, holds nothing, and fits a `T`.
        unsafe { ptr.cast::<T>().as_ptr().write(value) };
        handle
    }

    /// Allocates a handle and constructs its object with `init`.
    ///
    /// If `init` panics, the storage is released before the panic
    /// propagates, so a failed construction leaks nothing.
    pub fn allocate_with<T>(&self, init: impl FnOnce() -> T) -> Handle<T> {
        let handle = self.allocate::<T>();
        let guard = ReleaseOnUnwind {
            allocator: self,
            id: handle.id(),
        };
        let value = init();
        std::mem::forget(guard);

        let ptr = self.expect_fresh(handle.id());
        // SAFETY: the slot was issued above and nothing was written to it.
        unsafe { ptr.cast::<T>().as_ptr().write(value) };
        handle
    }

    fn allocate_in(&self, class: SizeClass) -> HandleId {
        if let Some((index, age)) = self.arena.alloc(class) {
            return HandleId::pool(index, age);
        }

        match self.heap.allocate(self.heap_layouts[class.index()]) {
            Ok(id) => id,
            Err(error) => fatal(self.name(), error),
        }
    }

    fn expect_fresh(&self, id: HandleId) -> NonNull<u8> {
        match self.locate(id, false) {
            Ok(ptr) => ptr,
            Err(miss) => fatal(self.name(), self.report(id, Operation::Allocate, miss)),
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Constructs `value` in the storage of `handle`.
    ///
    /// Any object already in the slot is overwritten without being dropped.
    ///
    /// # Panics
    ///
    /// Panics (fatally) if the handle is stale or corrupted, or if the
    /// storage was allocated for a smaller size class than `D` needs.
    ///
    /// # Safety
    ///
    /// `handle` must be live, and no reference into its storage may be in
    /// use. With use-after-free checks disabled, a stale handle writes into
    /// whatever object now occupies the slot.
    pub unsafe fn construct<D: Extends<B>, B>(&self, handle: Handle<B>, value: D) -> NonNull<D> {
        let ptr = self.resolve_for::<D>(handle.id(), Operation::Construct);
        ptr.as_ptr().write(value);
        ptr
    }

    /// Drops the `D` in `handle`'s storage and constructs `value` in its
    /// place.
    ///
    /// # Panics
    ///
    /// Same as [`construct`](Self::construct).
    ///
    /// # Safety
    ///
    /// As for [`construct`](Self::construct); in addition the storage must
    /// currently hold an initialized `D`.
    pub unsafe fn destroy_and_construct<D: Extends<B>, B>(
        &self,
        handle: Handle<B>,
        value: D,
    ) -> NonNull<D> {
        let ptr = self.resolve_for::<D>(handle.id(), Operation::Construct);
        ptr::drop_in_place(ptr.as_ptr());
        ptr.as_ptr().write(value);
        ptr
    }

    fn resolve_for<D>(&self, id: HandleId, operation: Operation) -> NonNull<D> {
        let _ = Self::size_class_of::<D>();
        let ptr = match self.locate(id, self.check_ages) {
            Ok(ptr) => ptr,
            Err(miss) => fatal(self.name(), self.report(id, operation, miss)),
        };
        let capacity = self.capacity_of(id);
        assert!(
            size_of::<D>() <= capacity,
            "HandleAllocator[{}]: {} bytes do not fit handle {id} with {capacity}-byte storage",
            self.name(),
            size_of::<D>(),
        );
        ptr.cast()
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Drops the `D` behind `handle` and releases its storage.
    ///
    /// The null handle is ignored. The handle is validated before anything is
    /// dropped, so a detected double-free never runs a destructor twice.
    ///
    /// # Panics
    ///
    /// Panics (fatally) with a double-free report if the handle was already
    /// released, or a corrupted-handle report if it was never issued.
    ///
    /// # Safety
    ///
    /// The storage must hold an initialized `D`, and no reference into it may
    /// outlive this call.
    pub unsafe fn deallocate<B, D: Extends<B>>(&self, handle: Handle<B>) {
        let id = handle.id();
        if id.is_null() {
            return;
        }
        let ptr = match self.locate(id, self.check_ages) {
            Ok(ptr) => ptr,
            Err(miss) => fatal(self.name(), self.report(id, Operation::Deallocate, miss)),
        };
        ptr::drop_in_place(ptr.cast::<D>().as_ptr());
        self.release(id);
    }

    /// Drops the `T` behind `handle` and releases its storage.
    ///
    /// # Safety
    ///
    /// See [`deallocate`](Self::deallocate).
    pub unsafe fn destroy<T>(&self, handle: Handle<T>) {
        self.deallocate::<T, T>(handle);
    }

    /// Releases storage that was allocated but never constructed into.
    ///
    /// # Panics
    ///
    /// Panics (fatally) on a double-free or corrupted handle. With
    /// use-after-free checks disabled, releasing a heap handle that is no
    /// longer live is a no-op.
    ///
    /// # Safety
    ///
    /// No reference into the storage may outlive this call. With
    /// use-after-free checks disabled, releasing a stale pool handle hands
    /// the same slot out twice.
    pub unsafe fn deallocate_storage<B>(&self, handle: Handle<B>) {
        if !handle.is_null() {
            self.release(handle.id());
        }
    }

    fn release(&self, id: HandleId) {
        if id.is_pool() {
            let (index, age) = id.decode_pool();
            let Some(class) = self.arena.class_of(index) else {
                fatal(self.name(), self.report(id, Operation::Deallocate, Miss::OutOfRange));
            };
            if let Err(AgeMismatch { expected, stored }) =
                self.arena.free(index, class, age, self.check_ages)
            {
                let miss = Miss::Stale { expected, stored };
                fatal(self.name(), self.report(id, Operation::Deallocate, miss));
            }
        } else if !self.heap.free(id) && self.check_ages {
            // Unknown heap IDs leave the map untouched; only reported when checking.
            let miss = self.heap_miss(id);
            fatal(self.name(), self.report(id, Operation::Deallocate, miss));
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolves `handle` to a pointer to its `D`.
    ///
    /// # Panics
    ///
    /// Panics (fatally) with a use-after-free or corrupted-handle report.
    #[inline]
    #[must_use]
    pub fn cast<D: Extends<B>, B>(&self, handle: Handle<B>) -> NonNull<D> {
        match self.try_cast(handle) {
            Ok(ptr) => ptr,
            Err(error) => fatal(self.name(), error),
        }
    }

    /// Resolves `handle` to a pointer to its `D`, reporting violations as
    /// errors instead of panicking.
    ///
    /// # Errors
    ///
    /// [`HandleError::UseAfterFree`], [`HandleError::CorruptedHandle`] or
    /// [`HandleError::NullHandle`].
    #[inline]
    pub fn try_cast<D: Extends<B>, B>(&self, handle: Handle<B>) -> HandleResult<NonNull<D>> {
        let id = handle.id();
        self.locate(id, self.check_ages)
            .map(NonNull::cast)
            .map_err(|miss| self.report(id, Operation::Cast, miss))
    }

    /// Checks if `handle` is live. Never panics.
    ///
    /// Ages are compared even when use-after-free checks are disabled.
    #[must_use]
    pub fn is_valid<B>(&self, handle: Handle<B>) -> bool {
        self.locate(handle.id(), true).is_ok()
    }

    #[inline]
    fn locate(&self, id: HandleId, check_age: bool) -> Result<NonNull<u8>, Miss> {
        if id.is_null() {
            return Err(Miss::Null);
        }
        if id.is_heap() {
            return self.heap.resolve(id).ok_or_else(|| self.heap_miss(id));
        }

        let (index, age) = id.decode_pool();
        let ptr = self
            .arena
            .class_of(index)
            .and_then(|_| self.arena.address(index))
            .ok_or(Miss::OutOfRange)?;
        if check_age {
            let stored = self.arena.age(index).ok_or(Miss::OutOfRange)?;
            if stored != age {
                return Err(Miss::Stale {
                    expected: age,
                    stored,
                });
            }
        }
        Ok(ptr)
    }

    fn heap_miss(&self, id: HandleId) -> Miss {
        if id.index() < self.heap.high_water() {
            Miss::Freed
        } else {
            Miss::NeverIssued
        }
    }

    fn capacity_of(&self, id: HandleId) -> usize {
        if id.is_pool() {
            self.arena
                .class_of(id.index())
                .map_or(0, |class| self.arena.stride(class))
        } else {
            self.heap.block_size(id).unwrap_or(0)
        }
    }

    /// Builds the diagnostic for a failed resolution. Tags are looked up
    /// only here, off the hot path.
    #[cold]
    fn report(&self, id: HandleId, operation: Operation, miss: Miss) -> HandleError {
        let tag = || self.tags.lookup(id);
        match miss {
            Miss::Null => HandleError::NullHandle { operation },
            Miss::OutOfRange | Miss::NeverIssued => HandleError::CorruptedHandle {
                id,
                operation,
                tag: tag(),
            },
            Miss::Stale { expected, stored } if operation == Operation::Deallocate => {
                HandleError::DoubleFree {
                    id,
                    size: self.capacity_of(id),
                    address: self
                        .arena
                        .address(id.index())
                        .map_or(0, |ptr| ptr.as_ptr() as usize),
                    expected_age: expected,
                    stored_age: stored,
                    tag: tag(),
                }
            }
            Miss::Freed if operation == Operation::Deallocate => HandleError::DoubleFree {
                id,
                size: 0,
                address: 0,
                expected_age: 0,
                stored_age: 0,
                tag: tag(),
            },
            Miss::Stale { .. } | Miss::Freed => HandleError::UseAfterFree {
                id,
                operation,
                tag: tag(),
            },
        }
    }

    // =========================================================================
    // Tags & statistics
    // =========================================================================

    /// Attaches a debug tag to `id`. Empty tags are ignored.
    pub fn associate_tag(&self, id: HandleId, tag: impl Into<Arc<str>>) {
        self.tags.associate(id, tag.into());
    }

    /// Debug tag of `id`, or `"(no tag)"`.
    #[must_use]
    pub fn tag(&self, id: HandleId) -> Arc<str> {
        self.tags.lookup(id)
    }

    /// Usage snapshot.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            arena_bytes: self.arena.used_bytes(),
            pools: self.arena.stats(),
            heap_live: self.heap.live(),
            heap_issued: self.heap.high_water().saturating_sub(1),
            heap_fallback_warned: self.heap.warned(),
        }
    }
}

impl<const P0: usize, const P1: usize, const P2: usize> Drop for HandleAllocator<P0, P1, P2> {
    fn drop(&mut self) {
        let [small, medium, large] = self.arena.stats();
        tracing::debug!(
            allocator = %self.config.name,
            outstanding = self.arena.outstanding(),
            small_peak = small.high_watermark,
            medium_peak = medium.high_watermark,
            large_peak = large.high_watermark,
            capacity = small.capacity,
            "handle arena released"
        );
    }
}

/// Returns a freshly allocated handle if construction unwinds.
struct ReleaseOnUnwind<'a, const P0: usize, const P1: usize, const P2: usize> {
    allocator: &'a HandleAllocator<P0, P1, P2>,
    id: HandleId,
}

impl<const P0: usize, const P1: usize, const P2: usize> Drop for ReleaseOnUnwind<'_, P0, P1, P2> {
    fn drop(&mut self) {
        self.allocator.release(self.id);
    }
}
