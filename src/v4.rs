//! V4 — the buddy allocator (spec §4.4).
//!
//! A fixed 1 MiB arena, reserved once, split into power-of-two blocks.
//! Each block's free-list linkage and bookkeeping (`order`, `is_free`)
//! live in the block's own leading bytes rather than an out-of-band side
//! table — the spec's literal contract (see DESIGN.md for why this crate
//! didn't switch to a side table the way the reference crate's own buddy
//! allocator does).

use crate::checker::{check_aligned, CheckError};
use crate::constants::{BUDDY_ARENA_SIZE, DWORD, MAX_ORDER, PAGE_SIZE};
use crate::error::{AllocError, AllocErrorKind};
use crate::sys;
use std::ptr::NonNull;

#[repr(C)]
struct BuddyNode {
    prev: Option<NonNull<BuddyNode>>,
    next: Option<NonNull<BuddyNode>>,
    order: u8,
    is_free: bool,
}

const RAW_HEADER_SIZE: usize = std::mem::size_of::<BuddyNode>();
const HEADER_SIZE: usize = (RAW_HEADER_SIZE + DWORD - 1) & !(DWORD - 1);

#[inline]
const fn block_size(order: usize) -> usize {
    PAGE_SIZE << order
}

/// Usable bytes in a smallest-order (single-page) block once its in-block
/// header is accounted for — what V5 asks for when it wants one page.
pub const fn page_capacity() -> usize {
    block_size(0) - HEADER_SIZE
}

/// The V4 allocator: one arena, `MAX_ORDER + 1` free lists.
pub struct BuddyAllocator {
    arena: NonNull<u8>,
    free_lists: [Option<NonNull<BuddyNode>>; MAX_ORDER + 1],
}

// The arena and every node pointer into it are only ever touched by the
// owning allocator under the caller's own serialization (spec §5).
unsafe impl Send for BuddyAllocator {}

impl BuddyAllocator {
    /// Reserves the arena and seeds a single free block spanning all of it
    /// at `MAX_ORDER`.
    pub fn new() -> Result<Self, AllocError> {
        let ptr = unsafe { sys::allocate_region(BUDDY_ARENA_SIZE) }
            .ok_or(AllocError(AllocErrorKind::OutOfMemory))?;
        let arena = NonNull::new(ptr).expect("mmap/VirtualAlloc returned a null success pointer");

        let mut allocator = Self {
            arena,
            free_lists: [None; MAX_ORDER + 1],
        };
        unsafe {
            let root = arena.as_ptr() as *mut BuddyNode;
            root.write(BuddyNode {
                prev: None,
                next: None,
                order: MAX_ORDER as u8,
                is_free: true,
            });
        }
        allocator.free_lists[MAX_ORDER] = Some(arena.cast());
        Ok(allocator)
    }

    fn list_push(&mut self, order: usize, node: NonNull<BuddyNode>) {
        unsafe {
            let old_head = self.free_lists[order];
            (*node.as_ptr()).prev = None;
            (*node.as_ptr()).next = old_head;
            (*node.as_ptr()).order = order as u8;
            (*node.as_ptr()).is_free = true;
            if let Some(head) = old_head {
                (*head.as_ptr()).prev = Some(node);
            }
        }
        self.free_lists[order] = Some(node);
    }

    fn list_remove(&mut self, order: usize, node: NonNull<BuddyNode>) {
        unsafe {
            let prev = (*node.as_ptr()).prev;
            let next = (*node.as_ptr()).next;
            match prev {
                Some(p) => (*p.as_ptr()).next = next,
                None => self.free_lists[order] = next,
            }
            if let Some(n) = next {
                (*n.as_ptr()).prev = prev;
            }
        }
    }

    fn order_for(&self, payload_size: usize) -> Option<usize> {
        let needed = payload_size.checked_add(HEADER_SIZE)?;
        (0..=MAX_ORDER).find(|&o| block_size(o) >= needed)
    }

    fn offset_of(&self, ptr: *mut u8) -> usize {
        ptr as usize - self.arena.as_ptr() as usize
    }

    fn buddy_of(&self, offset: usize, order: usize) -> *mut u8 {
        unsafe { self.arena.as_ptr().add(offset ^ block_size(order)) }
    }

    /// Allocates `size` bytes, rounding up to the smallest order whose
    /// block can hold `size` plus the in-block header. Rejects `size ==
    /// 0`.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let order = self.order_for(size)?;

        let Some(source_order) = (order..=MAX_ORDER).find(|&o| self.free_lists[o].is_some()) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(size, order, "buddy allocator has no block large enough");
            return None;
        };
        #[cfg(feature = "tracing")]
        if source_order != order {
            tracing::trace!(order, source_order, "buddy allocator splitting a larger block");
        }
        let mut node = self.free_lists[source_order].unwrap();
        self.list_remove(source_order, node);

        for o in (order..source_order).rev() {
            let block = node.as_ptr() as *mut u8;
            let buddy_offset = self.offset_of(block) ^ block_size(o);
            let buddy_ptr = unsafe { self.arena.as_ptr().add(buddy_offset) } as *mut BuddyNode;
            unsafe {
                buddy_ptr.write(BuddyNode {
                    prev: None,
                    next: None,
                    order: o as u8,
                    is_free: true,
                });
            }
            self.list_push(o, NonNull::new(buddy_ptr).unwrap());
            node = NonNull::new(block as *mut BuddyNode).unwrap();
        }

        unsafe {
            (*node.as_ptr()).order = order as u8;
            (*node.as_ptr()).is_free = false;
        }

        let payload = unsafe { (node.as_ptr() as *mut u8).add(HEADER_SIZE) };
        NonNull::new(payload)
    }

    /// Frees `ptr`, cascading merges with its buddy for as long as the
    /// buddy is free and of the same order. A no-op on `None`.
    pub fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        let mut block = unsafe { ptr.as_ptr().sub(HEADER_SIZE) };
        let mut order = unsafe { (*(block as *mut BuddyNode)).order as usize };

        while order < MAX_ORDER {
            let offset = self.offset_of(block);
            let buddy_ptr = self.buddy_of(offset, order);
            let buddy_node = buddy_ptr as *mut BuddyNode;
            let buddy_is_free = unsafe { (*buddy_node).is_free };
            let buddy_order = unsafe { (*buddy_node).order as usize };

            if !buddy_is_free || buddy_order != order {
                break;
            }

            self.list_remove(order, NonNull::new(buddy_node).unwrap());
            block = block.min(buddy_ptr);
            order += 1;
            #[cfg(feature = "tracing")]
            tracing::trace!(order, "buddy allocator merged with free buddy");
        }

        self.list_push(order, NonNull::new(block as *mut BuddyNode).unwrap());
    }

    /// Checks I4 (every free-list node is actually marked free, at the
    /// order its list holds it under) and I3 (payload alignment).
    pub fn check_invariants(&self) -> Result<(), CheckError> {
        for (order, head) in self.free_lists.iter().enumerate() {
            let mut curr = *head;
            while let Some(node) = curr {
                let raw = node.as_ptr() as *mut u8;
                if unsafe { !(*node.as_ptr()).is_free } {
                    return Err(CheckError {
                        law: "I4",
                        detail: format!("free-list node {:p} is not marked free", raw),
                    });
                }
                if unsafe { (*node.as_ptr()).order as usize } != order {
                    return Err(CheckError {
                        law: "I4",
                        detail: format!("node {:p} sits in order-{} list with order {}", raw, order, unsafe {
                            (*node.as_ptr()).order
                        }),
                    });
                }
                check_aligned(unsafe { raw.add(HEADER_SIZE) })?;
                curr = unsafe { (*node.as_ptr()).next };
            }
        }
        Ok(())
    }
}

impl Drop for BuddyAllocator {
    fn drop(&mut self) {
        unsafe {
            sys::free_region(self.arena.as_ptr(), BUDDY_ARENA_SIZE);
        }
    }
}
