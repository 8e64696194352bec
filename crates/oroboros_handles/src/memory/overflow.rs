//! # Overflow Heap
//!
//! System-heap fallback once an arena size class is exhausted.
//!
//! Heap handles carry a counter value instead of an address, so the heap
//! keeps a map from handle ID to block. The counter never wraps: running out
//! of 31-bit indices is reported as [`HandleError::HandleSpaceExhausted`].

#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{HandleError, HandleResult};
use crate::handle::id::MAX_HEAP_INDEX;
use crate::handle::HandleId;

/// A system-heap block owned by the overflow heap.
struct HeapBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the block is exclusively owned by the map entry that holds it.
unsafe impl Send for HeapBlock {}

impl HeapBlock {
    fn release(self) {
        // SAFETY: `ptr` was allocated with `layout` and is released once,
        // when its entry leaves the map.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Mutex-guarded map from heap handle IDs to system-heap blocks.
pub(crate) struct OverflowHeap {
    /// Allocator name for diagnostics.
    name: String,
    /// Live blocks.
    blocks: Mutex<HashMap<HandleId, HeapBlock>>,
    /// Next heap index to issue. Everything below it was issued once.
    next_index: AtomicU32,
    /// Set once the first fallback has been logged.
    warned: AtomicBool,
}

impl OverflowHeap {
    /// Creates an empty overflow heap.
    pub(crate) fn new(name: &str) -> Self {
        Self::starting_at(name, 1)
    }

    /// Creates an empty overflow heap whose first handle has index `first`.
    pub(crate) fn starting_at(name: &str, first: u32) -> Self {
        Self {
            name: name.to_owned(),
            blocks: Mutex::new(HashMap::new()),
            next_index: AtomicU32::new(first),
            warned: AtomicBool::new(false),
        }
    }

    /// Allocates a block for `layout` and issues a heap handle for it.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::HandleSpaceExhausted`] once every 31-bit
    /// index has been issued.
    pub(crate) fn allocate(&self, layout: Layout) -> HandleResult<HandleId> {
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                allocator = %self.name,
                "arena size class exhausted, falling back to the system heap; \
                 increase the arena size for this workload"
            );
        }

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        if index > MAX_HEAP_INDEX {
            self.next_index.store(MAX_HEAP_INDEX + 1, Ordering::Relaxed);
            return Err(HandleError::HandleSpaceExhausted {
                name: self.name.clone(),
            });
        }

        // SAFETY: callers pass slot-sized layouts, never zero-sized.
        let ptr = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        let id = HandleId::heap(index);
        self.blocks.lock().insert(id, HeapBlock { ptr, layout });
        Ok(id)
    }

    /// Looks up the block behind `id`.
    pub(crate) fn resolve(&self, id: HandleId) -> Option<NonNull<u8>> {
        self.blocks.lock().get(&id).map(|block| block.ptr)
    }

    /// Usable size of the block behind `id`.
    pub(crate) fn block_size(&self, id: HandleId) -> Option<usize> {
        self.blocks.lock().get(&id).map(|block| block.layout.size())
    }

    /// Releases the block behind `id`.
    ///
    /// Returns `false` if `id` is not live.
    pub(crate) fn free(&self, id: HandleId) -> bool {
        let block = self.blocks.lock().remove(&id);
        match block {
            Some(block) => {
                block.release();
                true
            }
            None => false,
        }
    }

    /// The next index to be issued. Absent IDs below it were freed.
    #[inline]
    pub(crate) fn high_water(&self) -> u32 {
        self.next_index.load(Ordering::Relaxed)
    }

    /// Number of live heap handles.
    pub(crate) fn live(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Whether the first-fallback warning has been logged.
    pub(crate) fn warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}

impl Drop for OverflowHeap {
    fn drop(&mut self) {
        let blocks = std::mem::take(self.blocks.get_mut());
        if blocks.is_empty() {
            return;
        }

        let mut leaked: Vec<u32> = blocks.keys().map(|id| id.raw()).collect();
        leaked.sort_unstable();
        tracing::error!(
            allocator = %self.name,
            count = leaked.len(),
            ids = ?leaked,
            "heap handles leaked: never destroyed before shutdown"
        );

        for block in blocks.into_values() {
            block.release();
        }
    }
}
