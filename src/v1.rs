//! V1 — the naive linear allocator (spec §4.1).
//!
//! A singly-linked list of every block, free or allocated, first-fit
//! scanned, serialized behind one coarse mutex. No splitting, no growing a
//! reused block, no coalescing — the cost of simplicity is fragmentation.

use crate::checker::{check_aligned, CheckError};
use crate::constants::{DWORD, PROGRAM_BREAK_RESERVE};
use crate::error::{AllocError, AllocErrorKind};
use crate::progbrk::ProgramBreak;
use std::ptr::NonNull;
use std::sync::Mutex;

#[repr(C, align(16))]
struct Header {
    size: usize,
    free: bool,
    next: Option<NonNull<Header>>,
}

#[inline]
fn round_up_dword(size: usize) -> usize {
    (size + DWORD - 1) & !(DWORD - 1)
}

struct NaiveState {
    prog: ProgramBreak,
    head: Option<NonNull<Header>>,
    tail: Option<NonNull<Header>>,
}

// Raw intrusive pointers under a single lock; never touched outside it.
unsafe impl Send for NaiveState {}

/// The V1 allocator: `allocate`/`free` behind one `Mutex`.
pub struct NaiveAllocator {
    state: Mutex<NaiveState>,
}

impl NaiveAllocator {
    /// Creates an allocator with nothing yet committed to the break.
    pub fn new() -> Result<Self, AllocError> {
        Ok(Self {
            state: Mutex::new(NaiveState {
                prog: ProgramBreak::new(PROGRAM_BREAK_RESERVE)?,
                head: None,
                tail: None,
            }),
        })
    }

    fn find_free(state: &NaiveState, payload_size: usize) -> Option<NonNull<Header>> {
        let mut curr = state.head;
        while let Some(node) = curr {
            let header = unsafe { node.as_ref() };
            if header.free && header.size >= payload_size {
                return Some(node);
            }
            curr = header.next;
        }
        None
    }

    /// Allocates `size` bytes. Rejects `size == 0`.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let payload_size = round_up_dword(size);
        let mut state = self.state.lock().unwrap();

        if let Some(mut node) = Self::find_free(&state, payload_size) {
            unsafe { node.as_mut().free = false };
            return Some(unsafe { payload_of(node) });
        }

        let total_size = std::mem::size_of::<Header>() + payload_size;
        let base = match state.prog.extend(total_size) {
            Ok(base) => base,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(size, "naive allocator out of memory");
                return None;
            }
        };
        let mut header = base.cast::<Header>();
        unsafe {
            header.as_ptr().write(Header {
                size: payload_size,
                free: false,
                next: None,
            });
        }

        if state.head.is_none() {
            state.head = Some(header);
        }
        if let Some(mut tail) = state.tail {
            unsafe { tail.as_mut().next = Some(header) };
        }
        state.tail = Some(header);

        Some(unsafe { payload_of(header) })
    }

    /// Frees `ptr`. A no-op on `None`.
    ///
    /// If the freed block sits at the break's current tail, its footprint
    /// is returned to the OS outright instead of being kept on the free
    /// list — the spec's corrected tail-shrink behavior (see DESIGN.md for
    /// the bug in the original `sbrk` arithmetic this fixes).
    pub fn free(&self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        let mut node = header_of(ptr);
        let mut state = self.state.lock().unwrap();

        let block_end = unsafe {
            let header = node.as_ref();
            (ptr.as_ptr() as usize) + header.size
        };

        if block_end == state.prog.current_break() as usize {
            if state.head == Some(node) && state.tail == Some(node) {
                state.head = None;
                state.tail = None;
            } else {
                // Singly linked: find the predecessor of `node` by walking
                // from the head, same as the original implementation.
                let mut curr = state.head;
                while let Some(mut n) = curr {
                    let next = unsafe { n.as_ref().next };
                    if next == Some(node) {
                        unsafe { n.as_mut().next = None };
                        state.tail = Some(n);
                        break;
                    }
                    curr = next;
                }
            }

            let footprint = std::mem::size_of::<Header>() + unsafe { node.as_ref().size };
            state.prog.shrink(footprint);
            return;
        }

        unsafe { node.as_mut().free = true };
    }

    /// Best-effort integrity pass: checks I3 alignment on every live block
    /// and that the list doesn't loop back on itself.
    pub fn check_invariants(&self) -> Result<(), CheckError> {
        let state = self.state.lock().unwrap();
        let mut seen = 0usize;
        let mut curr = state.head;
        while let Some(node) = curr {
            check_aligned(unsafe { payload_of(node) }.as_ptr())?;
            seen += 1;
            if seen > 1_000_000 {
                return Err(CheckError {
                    law: "list",
                    detail: "naive block list appears to cycle".to_string(),
                });
            }
            curr = unsafe { node.as_ref().next };
        }
        Ok(())
    }
}

unsafe fn payload_of(header: NonNull<Header>) -> NonNull<u8> {
    header.cast::<u8>().add(std::mem::size_of::<Header>())
}

fn header_of(payload: NonNull<u8>) -> NonNull<Header> {
    unsafe { payload.cast::<Header>().sub(1) }
}
