//! V3 — explicit free list over V2's boundary-tag layout (spec §4.3).
//!
//! Same header/footer block layout as V2, but free blocks additionally
//! carry a doubly-linked list threaded through their own payload bytes
//! (`prev` at `bp`, `next` at `bp + WORD`). `find_fit` walks only that
//! list instead of the whole heap, and `coalesce` must keep the list
//! consistent as blocks merge — including the subtlety that a block
//! already on the list (the previous block in cases 3/4) is resized in
//! place rather than deleted and reinserted.

use crate::boundary::{
    adjusted_size, block_size, ftrp, hdrp, next_block, pack, prev_block, put_tags, unpack_alloc,
};
use crate::checker::{check_aligned, CheckError};
use crate::constants::{CHUNKSIZE, DWORD, PROGRAM_BREAK_RESERVE, WORD};
use crate::error::AllocError;
use crate::progbrk::ProgramBreak;
use std::ptr::NonNull;

unsafe fn set_prev(bp: *mut u8, v: *mut u8) {
    *(bp as *mut usize) = v as usize;
}

unsafe fn set_next(bp: *mut u8, v: *mut u8) {
    *(bp.add(WORD) as *mut usize) = v as usize;
}

unsafe fn get_prev(bp: *mut u8) -> *mut u8 {
    *(bp as *mut usize) as *mut u8
}

unsafe fn get_next(bp: *mut u8) -> *mut u8 {
    *(bp.add(WORD) as *mut usize) as *mut u8
}

/// The V3 allocator.
pub struct ExplicitAllocator {
    prog: ProgramBreak,
    heap_list_p: Option<NonNull<u8>>,
    free_list_p: Option<NonNull<u8>>,
}

impl ExplicitAllocator {
    /// Creates an allocator with nothing yet committed — initialization is
    /// lazy, same as V2.
    pub fn new() -> Result<Self, AllocError> {
        Ok(Self {
            prog: ProgramBreak::new(PROGRAM_BREAK_RESERVE)?,
            heap_list_p: None,
            free_list_p: None,
        })
    }

    fn initialize(&mut self) -> Result<(), AllocError> {
        let base = self.prog.extend(4 * WORD)?.as_ptr();
        unsafe {
            *(base as *mut usize) = 0;
            *(base.add(WORD) as *mut usize) = pack(DWORD, true);
            *(base.add(2 * WORD) as *mut usize) = pack(DWORD, true);
            *(base.add(3 * WORD) as *mut usize) = pack(0, true);
        }
        self.heap_list_p = NonNull::new(unsafe { base.add(2 * WORD) });

        self.extend(CHUNKSIZE / WORD)?;
        Ok(())
    }

    fn extend(&mut self, words: usize) -> Result<NonNull<u8>, AllocError> {
        let size = if words % 2 != 0 { (words + 1) * WORD } else { words * WORD };
        #[cfg(feature = "tracing")]
        tracing::trace!(size, "explicit allocator extending heap");
        let bp = self.prog.extend(size)?.as_ptr();

        unsafe {
            put_tags(bp, size, false);
            *(hdrp(next_block(bp))) = pack(0, true);
        }

        Ok(self.coalesce(bp))
    }

    fn insert_node(&mut self, bp: *mut u8) {
        unsafe {
            set_prev(bp, std::ptr::null_mut());
            let old_head = self.free_list_p.map_or(std::ptr::null_mut(), |p| p.as_ptr());
            set_next(bp, old_head);
            if let Some(head) = self.free_list_p {
                set_prev(head.as_ptr(), bp);
            }
        }
        self.free_list_p = NonNull::new(bp);
    }

    fn delete_node(&mut self, bp: *mut u8) {
        unsafe {
            let prev = get_prev(bp);
            let next = get_next(bp);
            if !prev.is_null() {
                set_next(prev, next);
            } else {
                self.free_list_p = NonNull::new(next);
            }
            if !next.is_null() {
                set_prev(next, prev);
            }
        }
    }

    /// Four-case coalescing, list-aware: cases touching the previous block
    /// resize it in place rather than delete-then-reinsert, since it is
    /// already linked.
    fn coalesce(&mut self, bp: *mut u8) -> NonNull<u8> {
        unsafe {
            let prev_alloc = unpack_alloc(*ftrp(prev_block(bp)));
            let next_alloc = unpack_alloc(*hdrp(next_block(bp)));
            let mut size = block_size(bp);

            match (prev_alloc, next_alloc) {
                (true, true) => {
                    self.insert_node(bp);
                    NonNull::new_unchecked(bp)
                }
                (true, false) => {
                    self.delete_node(next_block(bp));
                    size += block_size(next_block(bp));
                    put_tags(bp, size, false);
                    self.insert_node(bp);
                    NonNull::new_unchecked(bp)
                }
                (false, true) => {
                    size += block_size(prev_block(bp));
                    let merged = prev_block(bp);
                    put_tags(merged, size, false);
                    NonNull::new_unchecked(merged)
                }
                (false, false) => {
                    self.delete_node(next_block(bp));
                    size += block_size(prev_block(bp)) + block_size(next_block(bp));
                    let merged = prev_block(bp);
                    put_tags(merged, size, false);
                    NonNull::new_unchecked(merged)
                }
            }
        }
    }

    fn find_fit(&self, asize: usize) -> Option<NonNull<u8>> {
        let mut curr = self.free_list_p;
        while let Some(node) = curr {
            if unsafe { block_size(node.as_ptr()) } >= asize {
                return Some(node);
            }
            curr = NonNull::new(unsafe { get_next(node.as_ptr()) });
        }
        None
    }

    /// Always removes `bp` from the free list first (it's always a free
    /// block when called), then splits off a remainder if worthwhile.
    fn place(&mut self, bp: *mut u8, asize: usize) {
        self.delete_node(bp);
        let block = unsafe { block_size(bp) };
        if block - asize >= 2 * DWORD {
            unsafe {
                put_tags(bp, asize, true);
                put_tags(next_block(bp), block - asize, false);
            }
            self.insert_node(unsafe { next_block(bp) });
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

    /// Resizes the allocation at `ptr` to `new_size`, per spec §4.3's
    /// six-step algorithm: zero size frees; a null pointer allocates;
    /// shrinking splits the tail back to the free list; growing tries to
    /// merge the following free block in place before falling back to a
    /// fresh allocation plus copy.
    pub fn reallocate(&mut self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        if new_size == 0 {
            self.free(ptr);
            return None;
        }
        let Some(ptr) = ptr else {
            return self.allocate(new_size);
        };

        let bp = ptr.as_ptr();
        let asize = adjusted_size(new_size);
        let old_size = unsafe { block_size(bp) };

        if asize <= old_size {
            if old_size - asize >= 2 * DWORD {
                unsafe {
                    put_tags(bp, asize, true);
                    let remainder = next_block(bp);
                    put_tags(remainder, old_size - asize, false);
                    self.coalesce(remainder);
                }
            }
            return Some(ptr);
        }

        let next_is_free = !unsafe { unpack_alloc(*hdrp(next_block(bp))) };
        if next_is_free {
            let next = unsafe { next_block(bp) };
            let combined = old_size + unsafe { block_size(next) };
            if combined >= asize {
                self.delete_node(next);
                if combined - asize >= 2 * DWORD {
                    unsafe {
                        put_tags(bp, asize, true);
                        let remainder = next_block(bp);
                        put_tags(remainder, combined - asize, false);
                    }
                    self.insert_node(unsafe { next_block(bp) });
                } else {
                    unsafe { put_tags(bp, combined, true) };
                }
                return Some(ptr);
            }
        }

        let new_ptr = self.allocate(new_size)?;
        let copy_len = old_size.saturating_sub(DWORD).min(new_size);
        unsafe {
            std::ptr::copy_nonoverlapping(bp, new_ptr.as_ptr(), copy_len);
        }
        self.free(Some(ptr));
        Some(new_ptr)
    }

    /// Walks the free list checking that every node really is marked free
    /// and DWORD-aligned (I3), then walks the whole heap checking I1/I2
    /// the same way V2 does.
    pub fn check_invariants(&self) -> Result<(), CheckError> {
        let mut curr = self.free_list_p;
        while let Some(node) = curr {
            let bp = node.as_ptr();
            check_aligned(bp)?;
            if unsafe { unpack_alloc(*hdrp(bp)) } {
                return Err(CheckError {
                    law: "I2",
                    detail: format!("free list node {:p} is marked allocated", bp),
                });
            }
            curr = NonNull::new(unsafe { get_next(bp) });
        }

        let Some(start) = self.heap_list_p else { return Ok(()) };
        let mut bp = start.as_ptr();
        let mut prev_was_free = false;
        loop {
            let size = unsafe { block_size(bp) };
            if size == 0 {
                break;
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
            if is_free && prev_was_free {
                return Err(CheckError {
                    law: "I2",
                    detail: format!("adjacent free blocks meeting at {:p}", bp),
                });
            }
            prev_was_free = is_free;
            bp = unsafe { next_block(bp) };
        }
        Ok(())
    }
}
