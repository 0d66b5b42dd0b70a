//! V5 — the slab allocator (spec §4.5), layered on V4.
//!
//! A `Cache` holds fixed-size objects. Each backing page comes from a
//! [`BuddyAllocator`]; per-page bookkeeping (`Slab`) is *not* embedded in
//! the page the way some slab allocators do it — it's a separately
//! owned, `Box`-allocated record, matching the original design this was
//! distilled from. A bitmap tracks which of a slab's object slots are
//! taken; allocation always takes the lowest clear bit.

use crate::checker::CheckError;
use crate::constants::SLAB_BITMAP_WIDTH;
use crate::error::{AllocError, AllocErrorKind};
use crate::v4::BuddyAllocator;
use std::ptr::NonNull;

struct Slab {
    page: NonNull<u8>,
    free_count: usize,
    bitmap: u32,
    prev: Option<NonNull<Slab>>,
    next: Option<NonNull<Slab>>,
}

enum Where {
    Partial,
    Full,
    Free,
}

/// A cache of fixed-size objects, backed by one [`BuddyAllocator`] arena.
pub struct Cache {
    object_size: usize,
    objects_per_slab: usize,
    buddy: BuddyAllocator,
    partial: Option<NonNull<Slab>>,
    full: Option<NonNull<Slab>>,
    free: Option<NonNull<Slab>>,
}

impl Cache {
    /// Creates a cache of `object_size`-byte objects. `objects_per_slab`
    /// is however many fit in one page, capped at the bitmap's width.
    pub fn new(object_size: usize) -> Result<Self, AllocError> {
        if object_size == 0 {
            return Err(AllocError(AllocErrorKind::InvalidArgument));
        }
        let capacity = crate::v4::page_capacity();
        let objects_per_slab = (capacity / object_size).min(SLAB_BITMAP_WIDTH);
        if objects_per_slab == 0 {
            return Err(AllocError(AllocErrorKind::InvalidArgument));
        }
        Ok(Self {
            object_size,
            objects_per_slab,
            buddy: BuddyAllocator::new()?,
            partial: None,
            full: None,
            free: None,
        })
    }

    /// How many fixed-size objects fit in one slab of this cache.
    pub fn objects_per_slab(&self) -> usize {
        self.objects_per_slab
    }

    fn list_head_mut(&mut self, which: &Where) -> &mut Option<NonNull<Slab>> {
        match which {
            Where::Partial => &mut self.partial,
            Where::Full => &mut self.full,
            Where::Free => &mut self.free,
        }
    }

    fn push(&mut self, which: Where, slab: NonNull<Slab>) {
        unsafe {
            let old_head = *self.list_head_mut(&which);
            (*slab.as_ptr()).prev = None;
            (*slab.as_ptr()).next = old_head;
            if let Some(head) = old_head {
                (*head.as_ptr()).prev = Some(slab);
            }
        }
        *self.list_head_mut(&which) = Some(slab);
    }

    fn unlink(&mut self, which: Where, slab: NonNull<Slab>) {
        unsafe {
            let prev = (*slab.as_ptr()).prev;
            let next = (*slab.as_ptr()).next;
            match prev {
                Some(p) => (*p.as_ptr()).next = next,
                None => *self.list_head_mut(&which) = next,
            }
            if let Some(n) = next {
                (*n.as_ptr()).prev = prev;
            }
        }
    }

    /// Grows the cache by one slab, sourced from the buddy arena, pushed
    /// straight onto the partial list.
    fn grow(&mut self) -> Option<NonNull<Slab>> {
        let page = self.buddy.allocate(crate::v4::page_capacity())?;
        #[cfg(feature = "tracing")]
        tracing::trace!(object_size = self.object_size, "cache growing a fresh slab");
        let slab = Box::into_raw(Box::new(Slab {
            page,
            free_count: self.objects_per_slab,
            bitmap: 0,
            prev: None,
            next: None,
        }));
        let slab = NonNull::new(slab).unwrap();
        self.push(Where::Partial, slab);
        Some(slab)
    }

    /// Allocates one object: prefers a partially-full slab, then promotes
    /// a fully-free one back to partial, then grows a fresh slab.
    pub fn cache_alloc(&mut self) -> Option<NonNull<u8>> {
        let slab = if let Some(s) = self.partial {
            s
        } else if let Some(s) = self.free {
            self.unlink(Where::Free, s);
            self.push(Where::Partial, s);
            s
        } else {
            self.grow()?
        };

        let idx = unsafe {
            (0..self.objects_per_slab).find(|i| (*slab.as_ptr()).bitmap & (1 << i) == 0)?
        };

        unsafe {
            (*slab.as_ptr()).bitmap |= 1 << idx;
            (*slab.as_ptr()).free_count -= 1;

            let object = (*slab.as_ptr()).page.as_ptr().add(idx * self.object_size);

            if (*slab.as_ptr()).free_count == 0 {
                self.unlink(Where::Partial, slab);
                self.push(Where::Full, slab);
                #[cfg(feature = "tracing")]
                tracing::trace!(object_size = self.object_size, "slab filled, moved to full list");
            }

            NonNull::new(object)
        }
    }

    fn find_slab(&self, ptr: *mut u8) -> Option<(NonNull<Slab>, Where)> {
        let capacity = crate::v4::page_capacity();
        let contains = |slab: NonNull<Slab>| unsafe {
            let base = (*slab.as_ptr()).page.as_ptr();
            (ptr as usize) >= (base as usize) && (ptr as usize) < (base as usize + capacity)
        };

        let mut curr = self.partial;
        while let Some(s) = curr {
            if contains(s) {
                return Some((s, Where::Partial));
            }
            curr = unsafe { (*s.as_ptr()).next };
        }
        let mut curr = self.full;
        while let Some(s) = curr {
            if contains(s) {
                return Some((s, Where::Full));
            }
            curr = unsafe { (*s.as_ptr()).next };
        }
        None
    }

    /// Frees the object at `ptr`. A no-op on `None`.
    pub fn cache_free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        let Some((slab, where_now)) = self.find_slab(ptr.as_ptr()) else {
            return;
        };

        let idx = unsafe {
            (ptr.as_ptr() as usize - (*slab.as_ptr()).page.as_ptr() as usize) / self.object_size
        };

        unsafe {
            (*slab.as_ptr()).bitmap &= !(1 << idx);
            (*slab.as_ptr()).free_count += 1;

            if matches!(where_now, Where::Full) {
                self.unlink(Where::Full, slab);
                self.push(Where::Partial, slab);
            } else if (*slab.as_ptr()).free_count == self.objects_per_slab {
                self.unlink(Where::Partial, slab);
                self.push(Where::Free, slab);
            }
        }
    }

    /// Releases every slab (partial, full and free) back to the buddy
    /// arena and drops their metadata. Leaves the cache empty but still
    /// usable for further `cache_alloc` calls.
    pub fn cache_destroy(&mut self) {
        for which in [Where::Partial, Where::Full, Where::Free] {
            let mut curr = *self.list_head_mut(&which);
            while let Some(slab) = curr {
                let next = unsafe { (*slab.as_ptr()).next };
                let page = unsafe { (*slab.as_ptr()).page };
                self.buddy.free(Some(page));
                unsafe { drop(Box::from_raw(slab.as_ptr())) };
                curr = next;
            }
        }
        self.partial = None;
        self.full = None;
        self.free = None;
    }

    /// Checks I5 (a slab's `free_count` matches the bitmap's popcount) and
    /// I6 (no object slot is double-claimed — implied by the bitmap being
    /// the single source of truth, so this mainly guards against list
    /// corruption putting a slab on two lists at once).
    pub fn check_invariants(&self) -> Result<(), CheckError> {
        let lists = [
            (self.partial, "partial"),
            (self.full, "full"),
            (self.free, "free"),
        ];
        for (head, name) in lists {
            let mut curr = head;
            while let Some(slab) = curr {
                let (bitmap, free_count) =
                    unsafe { ((*slab.as_ptr()).bitmap, (*slab.as_ptr()).free_count) };
                let taken = (0..self.objects_per_slab).filter(|i| bitmap & (1 << i) != 0).count();
                if taken + free_count != self.objects_per_slab {
                    return Err(CheckError {
                        law: "I5",
                        detail: format!(
                            "{} slab {:p}: bitmap/free_count disagree ({} taken, {} free_count, {} per slab)",
                            name, slab.as_ptr(), taken, free_count, self.objects_per_slab
                        ),
                    });
                }
                curr = unsafe { (*slab.as_ptr()).next };
            }
        }
        Ok(())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.cache_destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_object_size() {
        assert!(Cache::new(0).is_err());
    }

    #[test]
    fn write_read_round_trip() {
        let mut cache = Cache::new(64).unwrap();
        let p = cache.cache_alloc().unwrap();
        unsafe {
            for i in 0..64u8 {
                p.as_ptr().add(i as usize).write(i);
            }
            for i in 0..64u8 {
                assert_eq!(p.as_ptr().add(i as usize).read(), i);
            }
        }
        cache.check_invariants().unwrap();
    }

    /// Scenario 8 (spec §8): filling a slab's every slot, then allocating
    /// once more, grows a second slab rather than reusing an in-use slot.
    #[test]
    fn filling_a_slab_grows_a_fresh_one() {
        let mut cache = Cache::new(128).unwrap();
        let per_slab = cache.objects_per_slab;

        let mut handles = Vec::with_capacity(per_slab);
        for _ in 0..per_slab {
            handles.push(cache.cache_alloc().unwrap());
        }
        assert!(cache.partial.is_none());
        assert!(cache.full.is_some());

        let overflow = cache.cache_alloc().unwrap();
        assert!(cache.partial.is_some());
        let _ = (handles, overflow);
        cache.check_invariants().unwrap();
    }

    /// Scenario 9: freeing one object out of a full slab demotes it back
    /// to partial, and the freed slot is the next one reused.
    #[test]
    fn freeing_from_a_full_slab_reuses_that_slot() {
        let mut cache = Cache::new(128).unwrap();
        let per_slab = cache.objects_per_slab;

        let mut handles = Vec::with_capacity(per_slab);
        for _ in 0..per_slab {
            handles.push(cache.cache_alloc().unwrap());
        }
        let freed = handles.remove(3);
        cache.cache_free(Some(freed));
        assert!(cache.partial.is_some());

        let reused = cache.cache_alloc().unwrap();
        assert_eq!(reused, freed);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn free_of_null_is_a_no_op() {
        let mut cache = Cache::new(64).unwrap();
        cache.cache_free(None);
    }

    #[test]
    fn fully_freed_slab_moves_to_the_free_list_and_is_reused_before_growing() {
        let mut cache = Cache::new(128).unwrap();
        let per_slab = cache.objects_per_slab;

        let handles: Vec<_> = (0..per_slab).map(|_| cache.cache_alloc().unwrap()).collect();
        for h in &handles {
            cache.cache_free(Some(*h));
        }
        assert!(cache.free.is_some());
        assert!(cache.partial.is_none());

        cache.cache_alloc().unwrap();
        assert!(cache.free.is_none());
        assert!(cache.partial.is_some());
        cache.check_invariants().unwrap();
    }
}
