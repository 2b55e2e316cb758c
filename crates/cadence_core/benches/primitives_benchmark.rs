//! # Core Primitives Benchmark
//!
//! Hot-path costs for the scheduler's per-frame primitives:
//! - slot pool insert/resolve/remove (one per pending wait)
//! - buffered list apply steps (once per frame per collection)
//!
//! Run with: `cargo bench --package cadence_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cadence_core::{BufferedList, SlotPool};

/// Benchmark: insert + get + remove cycle at various pool occupancies.
fn bench_slot_pool_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_pool_cycle");

    for occupancy in [16, 256, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(occupancy),
            &occupancy,
            |b, &occupancy| {
                let mut pool = SlotPool::with_capacity(occupancy + 1);
                for n in 0..occupancy {
                    pool.insert(n as u64);
                }
                b.iter(|| {
                    let id = pool.insert(black_box(99));
                    black_box(pool.get(id));
                    pool.remove(id)
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: resolving a stale handle (the miss path).
fn bench_slot_pool_stale_lookup(c: &mut Criterion) {
    let mut pool = SlotPool::new();
    let stale = pool.insert(1u64);
    pool.remove(stale);
    pool.insert(2u64); // reuses the slot under a new token

    c.bench_function("slot_pool_stale_lookup", |b| {
        b.iter(|| black_box(pool.get(black_box(stale))));
    });
}

/// Benchmark: one frame's worth of buffered mutations.
fn bench_buffered_list_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffered_list_apply");

    for batch in [8, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let list: BufferedList<u32> = BufferedList::new(|a, b| a == b);
            b.iter(|| {
                for n in 0..batch {
                    list.add(n, |_| {});
                }
                list.apply_add();
                for n in 0..batch {
                    list.remove(n, |_| {});
                }
                list.apply_remove()
            });
        });
    }
    group.finish();
}

/// Benchmark: snapshot cost against live-view size.
fn bench_buffered_list_snapshot(c: &mut Criterion) {
    let list: BufferedList<u32> = BufferedList::new(|a, b| a == b);
    for n in 0..1024 {
        list.add(n, |_| {});
    }
    list.apply_add();

    c.bench_function("buffered_list_snapshot_1024", |b| {
        b.iter(|| black_box(list.snapshot()));
    });
}

criterion_group!(
    benches,
    bench_slot_pool_cycle,
    bench_slot_pool_stale_lookup,
    bench_buffered_list_apply,
    bench_buffered_list_snapshot
);
criterion_main!(benches);
