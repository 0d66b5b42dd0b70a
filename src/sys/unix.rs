use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use std::ptr;

/// Reserves and commits a fresh, zeroed region of `size` bytes.
///
/// # Safety
/// `size` must be non-zero and page-aligned; callers own the returned
/// region until it is passed to [`free_region`] with the same size.
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Releases a region previously returned by [`allocate_region`].
///
/// # Safety
/// `ptr`/`size` must exactly match a prior `allocate_region` call; no
/// reference into the region may outlive this call.
pub unsafe fn free_region(ptr: *mut u8, size: usize) {
    munmap(ptr as *mut c_void, size);
}
