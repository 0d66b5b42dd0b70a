//! Error taxonomy for the allocator family (spec §7).
//!
//! Public allocation entry points keep the spec's contract — a null/`None`
//! return on failure, caller state unchanged — the same way
//! `std::alloc::GlobalAlloc` and this crate's `GhostAlloc` trait do.
//! `AllocError` exists for the internal plumbing that benefits from `?`,
//! and for callers who want to know *why* an allocation failed rather than
//! just that it did.

use core::fmt;

/// Why an allocator operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocErrorKind {
    /// The backing region could not be grown (or the buddy/slab pool is
    /// exhausted) to satisfy the request.
    OutOfMemory,
    /// `size == 0`, or a request otherwise violates a precondition callers
    /// control (e.g. a buddy order above `MAX_ORDER`).
    InvalidArgument,
}

/// The error type for allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError(pub AllocErrorKind);

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            AllocErrorKind::OutOfMemory => f.write_str("allocator out of memory"),
            AllocErrorKind::InvalidArgument => f.write_str("invalid allocation argument"),
        }
    }
}

impl std::error::Error for AllocError {}
