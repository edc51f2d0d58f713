//! Property tests for slab heap indexing and liveness invariants.

use churnpool::{SlabConfig, SlabHeap};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Insert(u64),
    /// Erase the live entry at this position (mod live count)
    Erase(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u64>().prop_map(Op::Insert),
        2 => any::<usize>().prop_map(Op::Erase),
    ]
}

fn heap(slots_per_block: usize) -> SlabHeap<u64> {
    SlabHeap::with_config(SlabConfig {
        block_bytes: slots_per_block * 8,
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn heap_matches_model(
        slots_per_block in 1usize..16,
        ops in prop::collection::vec(op(), 0..300),
    ) {
        let mut heap = heap(slots_per_block);
        let mut model: BTreeMap<usize, u64> = BTreeMap::new();
        let mut size = 0usize;

        for op in ops {
            match op {
                Op::Insert(value) => {
                    let slot = heap.emplace(value);
                    // never hands out a live index
                    prop_assert!(model.insert(slot.index, value).is_none());
                    prop_assert_eq!(heap.index_of(slot.as_ptr()), Some(slot.index));
                    size = size.max(slot.index + 1);
                }
                Op::Erase(pick) => {
                    if model.is_empty() {
                        continue;
                    }
                    let index = *model.keys().nth(pick % model.len()).unwrap();
                    heap.erase(index);
                    model.remove(&index);
                    prop_assert!(!heap.contains(index));
                }
            }

            prop_assert_eq!(heap.len(), model.len());
            prop_assert_eq!(heap.size(), size);
        }

        let live: Vec<_> = heap.iter_live().map(|(i, v)| (i, *v)).collect();
        let expected: Vec<_> = model.iter().map(|(&i, &v)| (i, v)).collect();
        prop_assert_eq!(live, expected);

        for (&index, &value) in &model {
            prop_assert_eq!(heap.get(index), Some(&value));
        }
    }

    #[test]
    fn raw_iteration_covers_every_issued_index(
        count in 1usize..200,
        erase_mask in prop::collection::vec(any::<bool>(), 200),
    ) {
        let mut heap = heap(8);
        for i in 0..count {
            heap.emplace(i as u64);
        }
        for i in 0..count {
            if erase_mask[i] {
                heap.erase(i);
            }
        }

        let raw: Vec<_> = heap.iter().collect();
        prop_assert_eq!(raw.len(), heap.size());
        for (position, slot) in raw.iter().enumerate() {
            prop_assert_eq!(slot.index(), position);
            prop_assert_eq!(slot.is_live(), heap.contains(position));
            prop_assert_eq!(slot.get().is_some(), slot.is_live());
        }
        prop_assert_eq!(heap.end() - heap.begin(), heap.size() as isize);
    }

    #[test]
    fn top_slot_is_reissued(
        slots_per_block in 2usize..16,
        fill in 1usize..64,
    ) {
        let mut heap = heap(slots_per_block);
        let mut last = 0;
        for i in 0..fill {
            last = heap.emplace(i as u64).index;
        }

        heap.erase(last);
        prop_assert_eq!(heap.emplace(7).index, last);
    }

    #[test]
    fn clear_restarts_from_zero(
        count in 0usize..100,
    ) {
        let mut heap = heap(4);
        for i in 0..count {
            heap.emplace(i as u64);
        }
        heap.clear();

        prop_assert!(heap.is_empty());
        prop_assert_eq!(heap.size(), 0);
        for i in 0..count {
            prop_assert!(!heap.contains(i));
        }
        prop_assert_eq!(heap.allocator().block_count(), 1);
        prop_assert_eq!(heap.emplace(1).index, 0);
    }
}
