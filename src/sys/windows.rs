use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use std::ptr;

/// Reserves and commits a fresh, zeroed region of `size` bytes.
///
/// # Safety
/// See the unix counterpart.
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    if ptr.is_null() {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Releases a region previously returned by [`allocate_region`].
///
/// # Safety
/// `ptr` must have been returned by `allocate_region`; `VirtualFree` with
/// `MEM_RELEASE` requires a size of 0 and frees the whole reservation.
pub unsafe fn free_region(ptr: *mut u8, _size: usize) {
    VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
}
