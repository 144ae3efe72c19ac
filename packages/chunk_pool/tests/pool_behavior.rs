//! Behavior of both pools under longer sequences of operations, observed through the public API.
#![allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::assertions_on_result_states,
    clippy::cast_possible_truncation,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::cell::Cell;
use std::collections::HashSet;
use std::num::NonZero;
use std::rc::Rc;

use chunk_pool::{DropPolicy, IndexedPool, LinkedPool, ObjectPool, PoolError, Pooled};
use new_zealand::nz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sets a flag when constructed and clears it when dropped.
struct Flagged {
    alive: Rc<Cell<bool>>,
}

impl Flagged {
    fn new(alive: &Rc<Cell<bool>>) -> Self {
        alive.set(true);

        Self {
            alive: Rc::clone(alive),
        }
    }
}

impl Drop for Flagged {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

/// Performs a random mix of creations and deletions, never holding more than `max_live`
/// objects, and verifies that every live object keeps its value throughout.
///
/// Returns the set of addresses that were ever handed out.
fn random_churn<P, T>(
    pool: &mut P,
    seed: u64,
    max_live: usize,
    steps: usize,
    make: impl Fn(usize) -> T,
) -> HashSet<usize>
where
    P: ObjectPool<T>,
    T: PartialEq + std::fmt::Debug,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut live: Vec<(Pooled<T>, usize)> = Vec::new();
    let mut addresses = HashSet::new();

    for step in 0..steps {
        let create = live.is_empty() || (live.len() < max_live && rng.random_bool(0.6));

        if create {
            let handle = pool.new_object(make(step));
            addresses.insert(handle.ptr().addr().get());
            live.push((handle, step));
        } else {
            let victim = rng.random_range(0..live.len());
            let (handle, _) = live.swap_remove(victim);
            pool.delete_object(handle);
        }

        assert_eq!(pool.len(), live.len());
    }

    for (handle, step) in &live {
        assert_eq!(*pool.get(handle), make(*step));
    }

    for (handle, _) in live {
        pool.delete_object(handle);
    }

    addresses
}

#[test]
fn block_count_follows_object_count() {
    for count in 1..20_usize {
        let mut linked = LinkedPool::<u64>::new(nz!(4));
        let mut indexed = IndexedPool::<u16>::new(nz!(4));

        let linked_handles = (0..count).map(|x| linked.new_object(x as u64)).collect::<Vec<_>>();
        let indexed_handles = (0..count)
            .map(|x| indexed.new_object(u16::try_from(x).unwrap()))
            .collect::<Vec<_>>();

        let expected_blocks = count.div_ceil(4);
        assert_eq!(linked.block_count(), expected_blocks);
        assert_eq!(indexed.block_count(), expected_blocks);

        for handle in linked_handles {
            linked.delete_object(handle);
        }

        for handle in indexed_handles {
            indexed.delete_object(handle);
        }
    }
}

#[test]
fn linked_pool_never_grows_beyond_peak_demand() {
    const CHUNKS: NonZero<usize> = nz!(8);
    const MAX_LIVE: usize = 20;

    let mut pool = LinkedPool::<[u64; 2]>::new(CHUNKS);

    let addresses = random_churn(&mut pool, 0x5eed, MAX_LIVE, 2000, |step| {
        [step as u64, !(step as u64)]
    });

    assert!(pool.block_count() <= MAX_LIVE.div_ceil(CHUNKS.get()));
    assert!(addresses.len() <= pool.capacity());
}

#[test]
fn indexed_pool_never_grows_beyond_peak_demand() {
    const CHUNKS: NonZero<usize> = nz!(5);
    const MAX_LIVE: usize = 23;

    let mut pool = IndexedPool::<[u8; 3]>::new(CHUNKS);

    let addresses = random_churn(&mut pool, 42, MAX_LIVE, 2000, |step| {
        let [a, b, c, ..] = step.to_le_bytes();
        [a, b, c]
    });

    assert!(pool.block_count() <= MAX_LIVE.div_ceil(CHUNKS.get()));
    assert!(addresses.len() <= pool.capacity());
}

#[test]
fn single_byte_items_use_full_index_range() {
    let mut pool = IndexedPool::<u8>::new(nz!(255));

    let addresses = random_churn(&mut pool, 7, 600, 5000, |step| (step % 251) as u8);

    assert!(addresses.len() <= pool.capacity());
    assert_eq!(pool.chunks_per_block(), 255);
}

// u32 is only smaller than a pointer on 64-bit targets.
#[cfg(target_pointer_width = "64")]
#[test]
fn four_byte_items_reuse_freed_chunk_before_growing_again() {
    // Blocks of three chunks for a four-byte type.
    let mut pool = IndexedPool::<u32>::new(nz!(3));

    let a1 = pool.new_object(1);
    let a1_address = a1.ptr();
    let a2 = pool.new_object(2);
    let a3 = pool.new_object(3);
    assert_eq!(pool.block_count(), 1);

    let a4 = pool.new_object(4);
    assert_eq!(pool.block_count(), 2);

    pool.delete_object(a1);

    // The chunk of a1 comes back before another block is needed.
    let mut later = Vec::new();
    let mut reused = false;

    for value in 5..8 {
        let handle = pool.new_object(value);
        reused |= handle.ptr() == a1_address;
        later.push(handle);
    }

    assert!(reused);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(*pool.get(&a2), 2);
    assert_eq!(*pool.get(&a3), 3);
    assert_eq!(*pool.get(&a4), 4);

    for handle in later.into_iter().chain([a2, a3, a4]) {
        pool.delete_object(handle);
    }
}

#[test]
fn construction_and_destruction_run_exactly_once() {
    let alive = Rc::new(Cell::new(false));
    let mut pool = LinkedPool::<Flagged>::new(nz!(2));

    let handle = pool.new_object_with(|| Flagged::new(&alive));
    assert!(alive.get());

    pool.delete_object(handle);
    assert!(!alive.get());
}

#[test]
fn construction_failure_leaves_no_object_behind() {
    let alive = Rc::new(Cell::new(false));
    let mut pool = LinkedPool::<Flagged>::new(nz!(1));

    let result = pool.try_new_object_with(|| {
        if alive.get() {
            Ok(Flagged::new(&alive))
        } else {
            Err(PoolError::ForeignObject)
        }
    });

    assert!(result.is_err());
    assert!(!alive.get());
    assert!(pool.is_empty());

    // The reserved chunk went back on the free list, so no second block is needed.
    let handle = pool.new_object_with(|| Flagged::new(&alive));
    assert_eq!(pool.block_count(), 1);
    pool.delete_object(handle);
}

#[test]
fn dropping_pool_drops_remaining_objects() {
    let first = Rc::new(Cell::new(false));
    let second = Rc::new(Cell::new(false));

    let mut pool = LinkedPool::<Flagged>::new(nz!(1));
    let first_handle = pool.new_object(Flagged::new(&first));
    let _second_handle = pool.new_object(Flagged::new(&second));

    pool.delete_object(first_handle);
    assert!(!first.get());
    assert!(second.get());

    drop(pool);
    assert!(!second.get());
}

#[test]
fn handles_from_another_pool_are_rejected() {
    let mut linked_a = LinkedPool::<u64>::builder()
        .drop_policy(DropPolicy::MustNotDropItems)
        .build();
    let mut linked_b = LinkedPool::<u64>::default();
    let mut indexed_a = IndexedPool::<u16>::builder()
        .drop_policy(DropPolicy::MustNotDropItems)
        .build();
    let mut indexed_b = IndexedPool::<u16>::default();

    let linked_handle = linked_a.new_object(1);
    let indexed_handle = indexed_a.new_object(1);

    let linked_rejected = linked_b.try_delete_object(linked_handle).unwrap_err();
    let indexed_rejected = indexed_b.try_delete_object(indexed_handle).unwrap_err();

    assert_eq!(linked_a.len(), 1);
    assert_eq!(indexed_a.len(), 1);

    // Both handles can still be used with the pools that issued them.
    linked_a.delete_object(linked_rejected.into_handle());
    indexed_a.delete_object(indexed_rejected.into_handle());
}

#[test]
fn pools_can_move_between_threads() {
    let mut pool = LinkedPool::<String>::new(nz!(4));
    let handle = pool.new_object("from main".to_string());

    let (pool, handle) = std::thread::spawn(move || {
        pool.get_mut(&handle).push_str(" and back");
        (pool, handle)
    })
    .join()
    .unwrap();

    let mut pool = pool;
    assert_eq!(pool.take_object(handle), "from main and back");
}

#[test]
fn empty_pool_with_strict_policy_drops_cleanly() {
    let mut pool = IndexedPool::<u8>::builder()
        .drop_policy(DropPolicy::MustNotDropItems)
        .chunks_per_block(nz!(10))
        .build();

    let handles = (0..25).map(|x| pool.new_object(x)).collect::<Vec<_>>();
    assert_eq!(pool.block_count(), 3);

    for handle in handles {
        pool.delete_object(handle);
    }
}
