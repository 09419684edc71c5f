//! # Allocator Benchmark
//!
//! Arena pushes and pool churn at renderer-sized capacities.
//!
//! Run with: `cargo bench --package lumen_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lumen_core::{Arena, Pool};

/// Per-frame scratch size used by the renderer tests.
const ARENA_BYTES: usize = 4 * 1024 * 1024;

/// Default buffer pool capacity.
const POOL_CAPACITY: u32 = 1024;

/// Benchmark: fill a frame arena with mixed aligned pushes, then clear.
fn bench_arena_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_frame");

    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut arena = Arena::new(ARENA_BYTES);
            b.iter(|| {
                while arena.push_aligned(size, 16).is_ok() {}
                black_box(arena.used());
                arena.clear();
            });
        });
    }

    group.finish();
}

/// Benchmark: checkpoint, push a burst, roll back.
fn bench_arena_rollback(c: &mut Criterion) {
    c.bench_function("arena_checkpoint_rollback", |b| {
        let mut arena = Arena::new(ARENA_BYTES);
        b.iter(|| {
            let mark = arena.checkpoint();
            for _ in 0..64 {
                black_box(arena.push_zero(128).ok());
            }
            arena.rollback(mark).ok();
        });
    });
}

/// Benchmark: allocate the whole pool, free it in reverse.
fn bench_pool_churn(c: &mut Criterion) {
    c.bench_function("pool_alloc_free_1024", |b| {
        let mut pool: Pool<[u64; 8]> = Pool::new(POOL_CAPACITY);
        let mut handles = Vec::with_capacity(POOL_CAPACITY as usize);
        b.iter(|| {
            while let Ok(handle) = pool.alloc([0; 8]) {
                handles.push(handle);
            }
            while let Some(handle) = handles.pop() {
                black_box(pool.free(handle).ok());
            }
        });
    });
}

criterion_group!(benches, bench_arena_frame, bench_arena_rollback, bench_pool_churn);
criterion_main!(benches);
