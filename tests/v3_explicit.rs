use allocator_lab::v3::ExplicitAllocator;

#[test]
fn realloc_chain_preserves_contents_through_grow_and_shrink() {
    let mut a = ExplicitAllocator::new().unwrap();
    let mut p = a.allocate(32).unwrap();
    unsafe {
        for i in 0..32u8 {
            p.as_ptr().add(i as usize).write(i);
        }
    }

    p = a.reallocate(Some(p), 256).unwrap();
    unsafe {
        for i in 0..32u8 {
            assert_eq!(p.as_ptr().add(i as usize).read(), i);
        }
    }

    p = a.reallocate(Some(p), 16).unwrap();
    unsafe {
        for i in 0..16u8 {
            assert_eq!(p.as_ptr().add(i as usize).read(), i);
        }
    }
    a.check_invariants().unwrap();
}

#[test]
fn free_then_allocate_same_size_reuses_the_lifo_head() {
    // Blockers between X/Y/Z keep each freed block from coalescing with
    // the next, so the free list really does hold three distinct nodes.
    let mut a = ExplicitAllocator::new().unwrap();
    let x = a.allocate(48).unwrap();
    let _block1 = a.allocate(48).unwrap();
    let y = a.allocate(48).unwrap();
    let _block2 = a.allocate(48).unwrap();
    let z = a.allocate(48).unwrap();

    a.free(Some(x));
    a.free(Some(y));
    a.free(Some(z));

    // LIFO: the most recently freed (z) comes back first.
    let r1 = a.allocate(48).unwrap();
    assert_eq!(r1, z);
    let r2 = a.allocate(48).unwrap();
    assert_eq!(r2, y);
    let r3 = a.allocate(48).unwrap();
    assert_eq!(r3, x);
    a.check_invariants().unwrap();
}
