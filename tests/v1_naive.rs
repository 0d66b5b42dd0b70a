use allocator_lab::v1::NaiveAllocator;

#[test]
fn interleaved_alloc_free_keeps_every_live_block_disjoint() {
    let a = NaiveAllocator::new().unwrap();
    let mut live = Vec::new();
    for i in 0..64 {
        let size = 16 + (i % 7) * 32;
        let p = a.allocate(size).unwrap();
        live.push((p, size));
        if i % 3 == 0 {
            if let Some((freed, _)) = live.pop() {
                a.free(Some(freed));
            }
        }
    }
    for i in 0..live.len() {
        for j in (i + 1)..live.len() {
            let (p1, n1) = live[i];
            let (p2, n2) = live[j];
            let (lo1, hi1) = (p1.as_ptr() as usize, p1.as_ptr() as usize + n1);
            let (lo2, hi2) = (p2.as_ptr() as usize, p2.as_ptr() as usize + n2);
            assert!(hi1 <= lo2 || hi2 <= lo1, "overlapping live allocations");
        }
    }
    a.check_invariants().unwrap();
}

#[test]
fn repeated_free_and_realloc_of_the_same_size_is_stable() {
    let a = NaiveAllocator::new().unwrap();
    let first = a.allocate(48).unwrap();
    a.free(Some(first));
    for _ in 0..10 {
        let p = a.allocate(48).unwrap();
        assert_eq!(p, first);
        a.free(Some(p));
    }
}
