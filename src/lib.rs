//! # `allocator-lab` — a progression of memory allocators
//!
//! Four increasingly sophisticated allocator designs sharing one conceptual
//! model: a contiguous byte region divided into self-describing blocks,
//! organized by a free-set index that accelerates the search for a block
//! satisfying a request.
//!
//! | Variant | Free-set structure | Notable behavior |
//! |---|---|---|
//! | [`v1::NaiveAllocator`] | singly-linked list of every block | first-fit, no split, no coalesce |
//! | [`v2::ImplicitAllocator`] | boundary-tagged blocks, linear walk | four-case coalescing |
//! | [`v3::ExplicitAllocator`] | doubly-linked free list in free payloads | LIFO insertion, in-place `realloc` |
//! | [`v4::BuddyAllocator`] | per-order free lists over a power-of-two arena | XOR-buddy coalescing |
//! | [`v5::Cache`] | bitmap-tracked slabs over a [`v4::BuddyAllocator`] | partial/full/free slab lists |
//!
//! Each variant owns its arena as instance state rather than module
//! statics, so independent allocators coexist and tests reset cleanly
//! (design notes, §9).
//!
//! ## Example
//!
//! ```rust
//! use allocator_lab::v2::ImplicitAllocator;
//!
//! let mut heap = ImplicitAllocator::new().unwrap();
//! let p = heap.allocate(100).unwrap();
//! unsafe { p.as_ptr().write(42) };
//! heap.free(Some(p));
//! ```

#![warn(missing_docs, clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod boundary;
pub mod checker;
pub mod constants;
pub mod error;
pub mod progbrk;
pub mod sys;
pub mod v1;
pub mod v2;
pub mod v3;
pub mod v4;
pub mod v5;

pub use checker::CheckError;
pub use error::{AllocError, AllocErrorKind};
pub use v1::NaiveAllocator;
pub use v2::ImplicitAllocator;
pub use v3::ExplicitAllocator;
pub use v4::BuddyAllocator;
pub use v5::Cache;

// Layout sanity checks for the constants every variant shares (spec §6).
const _: () = {
    assert!(constants::DWORD == constants::WORD * 2);
    assert!(constants::PAGE_SIZE.is_power_of_two());
    assert!(constants::BUDDY_ARENA_SIZE == constants::PAGE_SIZE << constants::MAX_ORDER);
};
