//! # Handle Allocator Error Types
//!
//! Protocol violations (use-after-free, double-free, corrupted handles) and
//! handle-space exhaustion are programmer errors in the caller. The allocator
//! reports them through [`fatal`], which logs and panics; the workspace
//! release profile aborts on panic. Configuration errors are ordinary
//! `Result`s.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::handle::HandleId;

/// The allocator operation during which an error was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Handle-to-pointer resolution.
    Cast,
    /// Liveness probe.
    IsValid,
    /// In-place construction into an existing handle.
    Construct,
    /// Destruction and release of a handle.
    Deallocate,
    /// Allocation of a new handle.
    Allocate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cast => "cast",
            Self::IsValid => "is_valid",
            Self::Construct => "construct",
            Self::Deallocate => "deallocate",
            Self::Allocate => "allocate",
        })
    }
}

/// Errors raised by the handle allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// A handle was used after its slot was freed (and possibly reused).
    #[error("use-after-free: handle {id} during {operation} (tag: {tag})")]
    UseAfterFree {
        /// The stale handle.
        id: HandleId,
        /// What the caller tried to do.
        operation: Operation,
        /// Debug tag associated with the handle.
        tag: Arc<str>,
    },

    /// A handle was freed whose slot had already been freed.
    #[error(
        "double-free: handle {id} (size {size}, address {address:#x}) \
         expected age {expected_age}, slot has age {stored_age} (tag: {tag})"
    )]
    DoubleFree {
        /// The handle being freed.
        id: HandleId,
        /// Size class in bytes of the freed storage.
        size: usize,
        /// Address the handle resolves to (0 for heap handles).
        address: usize,
        /// Age embedded in the handle.
        expected_age: u8,
        /// Age currently stored in the slot.
        stored_age: u8,
        /// Debug tag associated with the handle.
        tag: Arc<str>,
    },

    /// A handle that this allocator never issued.
    #[error("corrupted handle {id} during {operation} (tag: {tag})")]
    CorruptedHandle {
        /// The offending handle.
        id: HandleId,
        /// What the caller tried to do.
        operation: Operation,
        /// Debug tag associated with the handle.
        tag: Arc<str>,
    },

    /// The null handle was passed where a live handle is required.
    #[error("null handle passed to {operation}")]
    NullHandle {
        /// What the caller tried to do.
        operation: Operation,
    },

    /// The overflow heap ran out of 31-bit handle indices.
    #[error("handle space exhausted in allocator '{name}': increase the arena size")]
    HandleSpaceExhausted {
        /// Diagnostic name of the allocator.
        name: String,
    },

    /// The configured arena cannot be addressed by 27-bit handle indices.
    #[error("arena of {requested} bytes exceeds the addressable maximum of {max} bytes")]
    ArenaTooLarge {
        /// Requested arena size.
        requested: usize,
        /// Largest supported arena size.
        max: usize,
    },

    /// Invalid configuration file or values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HandleError {
    /// Returns the handle this error is about, if any.
    #[must_use]
    pub fn handle_id(&self) -> Option<HandleId> {
        match self {
            Self::UseAfterFree { id, .. }
            | Self::DoubleFree { id, .. }
            | Self::CorruptedHandle { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Checks if this error is a use-after-free or double-free.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UseAfterFree { .. } | Self::DoubleFree { .. } | Self::CorruptedHandle { .. }
        )
    }
}

/// Result type for handle allocator operations.
pub type HandleResult<T> = Result<T, HandleError>;

/// Reports an unrecoverable error and stops the calling thread.
///
/// The panic message is the error's `Display` text, so it always carries the
/// handle ID, the operation and the debug tag.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn fatal(allocator: &str, error: HandleError) -> ! {
    tracing::error!(allocator, %error, "fatal handle allocator error");
    panic!("HandleAllocator[{allocator}]: {error}");
}
