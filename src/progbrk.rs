//! A program-break primitive for V1–V3 (spec §6).
//!
//! Real `sbrk(2)` grows a process's data segment by asking the kernel for
//! more pages one call at a time. We don't have that syscall in userspace
//! Rust, so `ProgramBreak` reserves one large region up front with
//! [`sys::allocate_region`] and then treats the reservation the way `sbrk`
//! treats the break: a monotonically movable cursor, bumped by [`extend`]
//! and (for V1's tail-shrink case only) pulled back by [`shrink`].
//!
//! Each allocator variant owns its own `ProgramBreak`, so independent
//! arenas can coexist in the same process — the global mutable state
//! (`heap_list_p`, `free_list_p`, …) design notes §9 flags is kept as
//! instance state here rather than module statics.

use crate::error::{AllocError, AllocErrorKind};
use crate::sys;
use std::ptr::NonNull;

/// An owned, incrementally-grown region of address space.
pub struct ProgramBreak {
    base: NonNull<u8>,
    reserved: usize,
    used: usize,
}

// The raw pointer only ever moves through `extend`/`shrink` under the
// caller's own synchronization (V1 wraps this in a `Mutex`; V2/V3 require
// external serialization per spec §5).
unsafe impl Send for ProgramBreak {}

impl ProgramBreak {
    /// Reserves `reserved` bytes of address space with nothing yet
    /// committed to the logical break.
    pub fn new(reserved: usize) -> Result<Self, AllocError> {
        let ptr = unsafe { sys::allocate_region(reserved) }
            .ok_or(AllocError(AllocErrorKind::OutOfMemory))?;
        Ok(Self {
            base: NonNull::new(ptr).expect("mmap/VirtualAlloc returned a null success pointer"),
            reserved,
            used: 0,
        })
    }

    /// Advances the break by `delta` bytes, returning the base address of
    /// the newly appended region. Fails (break left unmoved) if the
    /// reservation would be exceeded.
    pub fn extend(&mut self, delta: usize) -> Result<NonNull<u8>, AllocError> {
        let new_used = match self.used.checked_add(delta).filter(|&u| u <= self.reserved) {
            Some(u) => u,
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(delta, used = self.used, reserved = self.reserved, "program break reservation exhausted");
                return Err(AllocError(AllocErrorKind::OutOfMemory));
            }
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(delta, new_used, "program break extended");

        let base = unsafe { self.base.as_ptr().add(self.used) };
        self.used = new_used;
        Ok(NonNull::new(base).unwrap())
    }

    /// Pulls the break back by `delta` bytes. Only ever called to release
    /// the arena's trailing block (V1's tail-shrink path); never shrinks
    /// past what has been committed.
    pub fn shrink(&mut self, delta: usize) {
        self.used = self.used.saturating_sub(delta);
    }

    /// The current top of the committed region (one past the last byte in
    /// use) — the Rust analogue of `sbrk(0)`.
    pub fn current_break(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.used) }
    }

    /// The start of the reserved region.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Bytes currently committed to the logical break.
    pub fn used(&self) -> usize {
        self.used
    }
}

impl Drop for ProgramBreak {
    fn drop(&mut self) {
        unsafe {
            sys::free_region(self.base.as_ptr(), self.reserved);
        }
    }
}
