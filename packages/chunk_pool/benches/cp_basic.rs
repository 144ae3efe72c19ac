//! Basic benchmarks for the `chunk_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use chunk_pool::{IndexedPool, LinkedPool};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type LargeItem = usize;
const LARGE_VALUE: LargeItem = 1024;

type SmallItem = u16;
const SMALL_VALUE: SmallItem = 1024;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_basic");

    group.bench_function("linked_build_empty", |b| {
        b.iter(|| drop(black_box(LinkedPool::<LargeItem>::default())));
    });

    group.bench_function("linked_new_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(LinkedPool::<LargeItem>::default)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.new_object(black_box(LARGE_VALUE)));
            }

            start.elapsed()
        });
    });

    group.bench_function("linked_new_delete", |b| {
        let mut pool = LinkedPool::<LargeItem>::default();

        // Keep one block alive so the loop measures reuse rather than growth.
        let _anchor = pool.new_object(LARGE_VALUE);

        b.iter(|| {
            let handle = pool.new_object(black_box(LARGE_VALUE));
            pool.delete_object(black_box(handle));
        });
    });

    group.bench_function("indexed_new_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(IndexedPool::<SmallItem>::default)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.new_object(black_box(SMALL_VALUE)));
            }

            start.elapsed()
        });
    });

    group.bench_function("indexed_new_delete", |b| {
        let mut pool = IndexedPool::<SmallItem>::default();
        let _anchor = pool.new_object(SMALL_VALUE);

        b.iter(|| {
            let handle = pool.new_object(black_box(SMALL_VALUE));
            pool.delete_object(black_box(handle));
        });
    });

    group.finish();

    let mut group = c.benchmark_group("chunk_slow");

    group.bench_function("linked_new_10k", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(LinkedPool::<LargeItem>::default)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                for _ in 0..10_000 {
                    _ = black_box(pool.new_object(black_box(LARGE_VALUE)));
                }
            }

            start.elapsed()
        });
    });

    // Deallocation in the indexed pool searches the blocks, so this is where many blocks hurt.
    group.bench_function("indexed_delete_10k", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;

            for _ in 0..iters {
                let mut pool = IndexedPool::<SmallItem>::default();
                let handles = (0..10_000)
                    .map(|_| pool.new_object(SMALL_VALUE))
                    .collect::<Vec<_>>();

                let start = Instant::now();

                for handle in handles {
                    pool.delete_object(black_box(handle));
                }

                total += start.elapsed();
            }

            total
        });
    });

    group.finish();
}
