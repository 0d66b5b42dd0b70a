//! Property-based checks for the "Laws" of spec §8: write-read round trip
//! and disjointness of live allocations, exercised across randomized
//! sequences of alloc/free calls for every variant.

use allocator_lab::{ExplicitAllocator, ImplicitAllocator, NaiveAllocator};
use proptest::prelude::*;
use std::ptr::NonNull;

#[derive(Debug, Clone, Copy)]
enum Op {
    Alloc(usize),
    Free(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..512).prop_map(Op::Alloc),
        (0usize..64).prop_map(Op::Free),
    ]
}

fn disjoint(live: &[(NonNull<u8>, usize)]) -> bool {
    for i in 0..live.len() {
        for j in (i + 1)..live.len() {
            let (p1, n1) = live[i];
            let (p2, n2) = live[j];
            let (lo1, hi1) = (p1.as_ptr() as usize, p1.as_ptr() as usize + n1);
            let (lo2, hi2) = (p2.as_ptr() as usize, p2.as_ptr() as usize + n2);
            if !(hi1 <= lo2 || hi2 <= lo1) {
                return false;
            }
        }
    }
    true
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn naive_keeps_live_allocations_disjoint_and_byte_stable(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let a = NaiveAllocator::new().unwrap();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
        for op in ops {
            match op {
                Op::Alloc(n) => {
                    if let Some(p) = a.allocate(n) {
                        unsafe { p.as_ptr().write(0xAB) };
                        live.push((p, n));
                    }
                }
                Op::Free(idx) => {
                    if !live.is_empty() {
                        let (p, _) = live.remove(idx % live.len());
                        a.free(Some(p));
                    }
                }
            }
            prop_assert!(disjoint(&live));
        }
        for (p, _) in &live {
            prop_assert_eq!(unsafe { p.as_ptr().read() }, 0xAB);
        }
    }

    #[test]
    fn implicit_keeps_live_allocations_disjoint_and_passes_invariants(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut a = ImplicitAllocator::new().unwrap();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
        for op in ops {
            match op {
                Op::Alloc(n) => {
                    if let Some(p) = a.allocate(n) {
                        live.push((p, n));
                    }
                }
                Op::Free(idx) => {
                    if !live.is_empty() {
                        let (p, _) = live.remove(idx % live.len());
                        a.free(Some(p));
                    }
                }
            }
            prop_assert!(disjoint(&live));
        }
        prop_assert!(a.check_invariants().is_ok());
    }

    #[test]
    fn explicit_keeps_live_allocations_disjoint_and_passes_invariants(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut a = ExplicitAllocator::new().unwrap();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
        for op in ops {
            match op {
                Op::Alloc(n) => {
                    if let Some(p) = a.allocate(n) {
                        live.push((p, n));
                    }
                }
                Op::Free(idx) => {
                    if !live.is_empty() {
                        let (p, _) = live.remove(idx % live.len());
                        a.free(Some(p));
                    }
                }
            }
            prop_assert!(disjoint(&live));
        }
        prop_assert!(a.check_invariants().is_ok());
    }
}
