//! # OROBOROS Handle Allocator
//!
//! 32-bit handles for GPU-resource proxy objects (buffers, textures,
//! programs, render targets) that rendering backends pass around instead of
//! pointers.
//!
//! - Objects live in a pre-allocated arena split into three size classes
//! - A handle is a slot index plus a 4-bit age, resolved without locking
//! - Stale handles (use-after-free, double-free) are detected and reported
//! - Exhausted size classes fall back to the system heap
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations in the steady state** - The arena is allocated once
//! 2. **Handles are `Copy` integers** - Ownership is the caller's protocol
//! 3. **Violations are fatal** - Diagnosed, logged, then the process stops
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_handles::{DefaultHandleAllocator, HandleAllocatorConfig};
//!
//! let handles = DefaultHandleAllocator::new(HandleAllocatorConfig::new("gl", 4 << 20))?;
//! let texture = handles.allocate_and_construct(GlTexture::new(1024, 1024));
//! handles.associate_tag(texture.id(), "shadow-map");
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod size_class;
pub mod stats;
pub mod tags;

pub use allocator::{DefaultHandleAllocator, HandleAllocator};
pub use config::HandleAllocatorConfig;
pub use error::{HandleError, HandleResult, Operation};
pub use handle::{Extends, Handle, HandleId};
pub use size_class::SizeClass;
pub use stats::{AllocatorStats, PoolStats};
pub use tags::{TagRegistry, NO_TAG};
