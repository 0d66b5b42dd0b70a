//! Boundary-tag bit-packing and block arithmetic shared by V2 and V3
//! (spec §3/§4.2). Pure pointer math with no coalescing policy — each
//! variant's `coalesce`/`place` still encodes its own case logic.

use crate::constants::{DWORD, WORD};

/// Packs a block size and allocated bit into one header/footer word.
/// `size` is always DWORD-aligned, so its low bit is free for the flag.
#[inline]
pub const fn pack(size: usize, alloc: bool) -> usize {
    size | (alloc as usize)
}

#[inline]
pub const fn unpack_size(word: usize) -> usize {
    word & !(DWORD - 1)
}

#[inline]
pub const fn unpack_alloc(word: usize) -> bool {
    word & 1 != 0
}

/// Header address for the block whose payload starts at `bp`.
#[inline]
pub unsafe fn hdrp(bp: *mut u8) -> *mut usize {
    bp.sub(WORD) as *mut usize
}

/// Size of the block whose payload starts at `bp`, read from its header.
#[inline]
pub unsafe fn block_size(bp: *mut u8) -> usize {
    unpack_size(*hdrp(bp))
}

/// Footer address for the block whose payload starts at `bp`.
#[inline]
pub unsafe fn ftrp(bp: *mut u8) -> *mut usize {
    bp.add(block_size(bp) - DWORD) as *mut usize
}

/// Payload pointer of the block physically following `bp`.
#[inline]
pub unsafe fn next_block(bp: *mut u8) -> *mut u8 {
    bp.add(block_size(bp))
}

/// Payload pointer of the block physically preceding `bp`, found via its
/// footer (the reason boundary tags exist at all: O(1) access to the
/// previous block's size without a full walk from the prologue).
#[inline]
pub unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
    let prev_size = unpack_size(*(bp.sub(DWORD) as *mut usize));
    bp.sub(prev_size)
}

/// Writes a header/footer pair for a block of `size` bytes starting at
/// payload pointer `bp`.
#[inline]
pub unsafe fn put_tags(bp: *mut u8, size: usize, alloc: bool) {
    let word = pack(size, alloc);
    *(bp.sub(WORD) as *mut usize) = word;
    *(bp.add(size - DWORD) as *mut usize) = word;
}

/// Rounds a requested payload size up to the block size `allocate` must
/// search for — `2*DWORD` minimum (header + footer + smallest payload),
/// otherwise header + footer + payload rounded up to a DWORD multiple.
#[inline]
pub const fn adjusted_size(size: usize) -> usize {
    if size <= DWORD {
        2 * DWORD
    } else {
        DWORD * ((size + DWORD + (DWORD - 1)) / DWORD)
    }
}
