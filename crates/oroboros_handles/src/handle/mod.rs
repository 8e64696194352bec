//! # Handles
//!
//! Opaque 32-bit identifiers for objects living in a handle allocator.
//!
//! ## Design Philosophy
//!
//! - A handle never exposes a pointer; resolution goes through the allocator
//! - Pool handles carry a 4-bit slot age for use-after-free detection
//! - Heap handles carry a counter value and a flag bit

pub mod id;
mod typed;

pub use id::HandleId;
pub use typed::{Extends, Handle};
