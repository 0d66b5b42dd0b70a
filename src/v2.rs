//! V2 — implicit free list with boundary tags (spec §4.2).
//!
//! The free set isn't a separate data structure; it's whatever sequence of
//! unallocated blocks a linear walk from the prologue turns up. Boundary
//! tags (header *and* footer) are what make `free` able to find the
//! previous block in O(1) instead of walking from the start of the heap.

use crate::boundary::{
    adjusted_size, block_size, ftrp, hdrp, next_block, pack, prev_block, put_tags, unpack_alloc,
};
use crate::checker::{check_aligned, CheckError};
use crate::constants::{CHUNKSIZE, DWORD, PROGRAM_BREAK_RESERVE, WORD};
use crate::error::AllocError;
use crate::progbrk::ProgramBreak;
use std::ptr::NonNull;

/// The V2 allocator. Single-threaded: callers serialize externally
/// (spec §5).
pub struct ImplicitAllocator {
    prog: ProgramBreak,
    /// Payload-style pointer to the prologue block; `None` until the first
    /// `allocate` lazily initializes the heap.
    heap_list_p: Option<NonNull<u8>>,
}

impl ImplicitAllocator {
    /// Creates an allocator with nothing yet committed — initialization is
    /// lazy, performed on the first `allocate`.
    pub fn new() -> Result<Self, AllocError> {
        Ok(Self {
            prog: ProgramBreak::new(PROGRAM_BREAK_RESERVE)?,
            heap_list_p: None,
        })
    }

    fn initialize(&mut self) -> Result<(), AllocError> {
        let base = self.prog.extend(4 * WORD)?.as_ptr();
        unsafe {
            *(base as *mut usize) = 0; // alignment padding
            *(base.add(WORD) as *mut usize) = pack(DWORD, true); // prologue header
            *(base.add(2 * WORD) as *mut usize) = pack(DWORD, true); // prologue footer
            *(base.add(3 * WORD) as *mut usize) = pack(0, true); // epilogue header
        }
        self.heap_list_p = NonNull::new(unsafe { base.add(2 * WORD) });

        self.extend(CHUNKSIZE / WORD)?;
        Ok(())
    }

    /// Extends the heap by `words` words (rounded to an even count to
    /// preserve DWORD alignment) and returns the coalesced free block.
    fn extend(&mut self, words: usize) -> Result<NonNull<u8>, AllocError> {
        let size = if words % 2 != 0 { (words + 1) * WORD } else { words * WORD };
        #[cfg(feature = "tracing")]
        tracing::trace!(size, "implicit allocator extending heap");
        let bp = self.prog.extend(size)?.as_ptr();

        unsafe {
            put_tags(bp, size, false);
            *(hdrp(next_block(bp))) = pack(0, true); // new epilogue
        }

        Ok(self.coalesce(bp))
    }

    /// Four-case boundary-tag coalescing (spec §4.2).
    fn coalesce(&mut self, bp: *mut u8) -> NonNull<u8> {
        unsafe {
            let prev_alloc = unpack_alloc(*ftrp(prev_block(bp)));
            let next_alloc = unpack_alloc(*hdrp(next_block(bp)));
            let mut size = block_size(bp);
            let mut result = bp;

            match (prev_alloc, next_alloc) {
                (true, true) => {}
                (true, false) => {
                    size += block_size(next_block(bp));
                    put_tags(bp, size, false);
                }
                (false, true) => {
                    size += block_size(prev_block(bp));
                    put_tags(prev_block(bp), size, false);
                    result = prev_block(bp);
                }
                (false, false) => {
                    size += block_size(prev_block(bp)) + block_size(next_block(bp));
                    put_tags(prev_block(bp), size, false);
                    result = prev_block(bp);
                }
            }

            NonNull::new_unchecked(result)
        }
    }

    /// First-fit linear walk from the prologue to the epilogue.
    fn find_fit(&self, asize: usize) -> Option<NonNull<u8>> {
        let mut bp = self.heap_list_p?.as_ptr();
        loop {
            let size = unsafe { block_size(bp) };
            if size == 0 {
                return None; // reached the epilogue
            }
            if !unsafe { unpack_alloc(*hdrp(bp)) } && size >= asize {
                return NonNull::new(bp);
            }
            bp = unsafe { next_block(bp) };
        }
    }

    fn place(&mut self, bp: *mut u8, asize: usize) {
        let block = unsafe { block_size(bp) };
        if block - asize >= 2 * DWORD {
            unsafe {
                put_tags(bp, asize, true);
                put_tags(next_block(bp), block - asize, false);
            }
        } else {
            unsafe { put_tags(bp, block, true) };
        }
    }

    /// Allocates `size` bytes. Rejects `size == 0`.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        if self.heap_list_p.is_none() {
            self.initialize().ok()?;
        }

        let asize = adjusted_size(size);

        if let Some(bp) = self.find_fit(asize) {
            self.place(bp.as_ptr(), asize);
            return Some(bp);
        }

        let extension = asize.max(CHUNKSIZE);
        let bp = self.extend(extension / WORD).ok()?;
        self.place(bp.as_ptr(), asize);
        Some(bp)
    }

    /// Frees `ptr`. A no-op on `None`.
    pub fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        let bp = ptr.as_ptr();
        unsafe {
            let size = block_size(bp);
            put_tags(bp, size, false);
        }
        self.coalesce(bp);
    }

    /// Walks the whole heap checking I1 (header == footer), I2 (no two
    /// adjacent free blocks) and I3 (alignment).
    pub fn check_invariants(&self) -> Result<(), CheckError> {
        let Some(start) = self.heap_list_p else { return Ok(()) };
        let mut bp = start.as_ptr();
        let mut prev_was_free = false;
        loop {
            let size = unsafe { block_size(bp) };
            if size == 0 {
                break; // epilogue
            }
            let header = unsafe { *hdrp(bp) };
            let footer = unsafe { *ftrp(bp) };
            if header != footer {
                return Err(CheckError {
                    law: "I1",
                    detail: format!("header/footer mismatch at {:p}", bp),
                });
            }
            let is_free = !unsafe { unpack_alloc(header) };
            if is_free {
                check_aligned(bp)?;
                if prev_was_free {
                    return Err(CheckError {
                        law: "I2",
                        detail: format!("adjacent free blocks meeting at {:p}", bp),
                    });
                }
            }
            prev_was_free = is_free;
            bp = unsafe { next_block(bp) };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc_n(a: &mut ImplicitAllocator, n: usize) -> NonNull<u8> {
        a.allocate(n).expect("allocation should succeed")
    }

    #[test]
    fn rejects_zero_size() {
        let mut a = ImplicitAllocator::new().unwrap();
        assert!(a.allocate(0).is_none());
    }

    #[test]
    fn write_read_round_trip() {
        let mut a = ImplicitAllocator::new().unwrap();
        let p = alloc_n(&mut a, 100);
        unsafe {
            for i in 0..100u8 {
                p.as_ptr().add(i as usize).write(i);
            }
            for i in 0..100u8 {
                assert_eq!(p.as_ptr().add(i as usize).read(), i);
            }
        }
        a.check_invariants().unwrap();
    }

    /// Scenario 1 (spec §8): allocate A, B, C of 64 bytes; free A, free B;
    /// allocate 100 should reuse A's address after coalescing A+B.
    #[test]
    fn coalesce_then_refit() {
        let mut a = ImplicitAllocator::new().unwrap();
        let block_a = alloc_n(&mut a, 64);
        let _b = alloc_n(&mut a, 64);
        let _c = alloc_n(&mut a, 64);

        a.free(Some(block_a));
        a.free(Some(_b));

        let reused = alloc_n(&mut a, 100);
        assert_eq!(reused, block_a);
        a.check_invariants().unwrap();
    }

    /// Scenario 2: allocate 200, free, allocate 10 — same address, smaller
    /// block after the split.
    #[test]
    fn split_on_refit() {
        let mut a = ImplicitAllocator::new().unwrap();
        let p = alloc_n(&mut a, 200);
        let original_size = unsafe { block_size(p.as_ptr()) };
        a.free(Some(p));

        let q = alloc_n(&mut a, 10);
        assert_eq!(p, q);
        let new_size = unsafe { block_size(q.as_ptr()) };
        assert!(new_size < original_size);
        a.check_invariants().unwrap();
    }

    #[test]
    fn disjointness_of_live_allocations() {
        let mut a = ImplicitAllocator::new().unwrap();
        let p1 = alloc_n(&mut a, 48);
        let p2 = alloc_n(&mut a, 96);
        let end1 = p1.as_ptr() as usize + 48;
        assert!(end1 <= p2.as_ptr() as usize);
    }

    #[test]
    fn extends_across_multiple_chunks() {
        let mut a = ImplicitAllocator::new().unwrap();
        for _ in 0..20 {
            alloc_n(&mut a, CHUNKSIZE);
        }
        a.check_invariants().unwrap();
    }
}
