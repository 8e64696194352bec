//! # Handle Allocator Benchmark
//!
//! Measures the per-frame operations rendering backends issue:
//! - allocate + construct
//! - handle resolution (cast / is_valid)
//! - destroy
//!
//! Run with: `cargo bench --package oroboros_handles`

// Benchmarks don't need docs; destroying through handles is unsafe
#![allow(missing_docs)]
#![allow(unsafe_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use oroboros_handles::{DefaultHandleAllocator, Handle};

/// Arena size used by the benchmarks (4 MiB, the default).
const ARENA_BYTES: usize = 4 * 1024 * 1024;

/// A uniform-buffer proxy, small size class.
#[derive(Clone, Copy)]
struct UniformBuffer {
    id: u32,
    size: u32,
    offset: u64,
}

/// Benchmark: allocate, construct and destroy one handle.
fn bench_allocate_destroy(c: &mut Criterion) {
    let handles = DefaultHandleAllocator::with_arena_size("bench", ARENA_BYTES).unwrap();

    c.bench_function("allocate_construct_destroy", |b| {
        b.iter(|| {
            let h = handles.allocate_and_construct(UniformBuffer {
                id: 1,
                size: 256,
                offset: 0,
            });
            unsafe { handles.destroy(black_box(h)) };
        });
    });
}

/// Benchmark: resolve live handles.
fn bench_cast(c: &mut Criterion) {
    let mut group = c.benchmark_group("cast");

    for count in [1_000, 10_000] {
        let handles = DefaultHandleAllocator::with_arena_size("bench", ARENA_BYTES).unwrap();
        let live: Vec<Handle<UniformBuffer>> = (0..count)
            .map(|i| {
                handles.allocate_and_construct(UniformBuffer {
                    id: i,
                    size: 256,
                    offset: u64::from(i) * 256,
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &live, |b, live| {
            b.iter(|| {
                let mut total = 0u64;
                for h in live {
                    let buffer = unsafe { handles.cast::<UniformBuffer, _>(*h).as_ref() };
                    total += u64::from(buffer.id + buffer.size) + buffer.offset;
                }
                black_box(total)
            });
        });

        for h in live {
            unsafe { handles.destroy(h) };
        }
    }

    group.finish();
}

/// Benchmark: liveness probe on stale handles.
fn bench_is_valid_stale(c: &mut Criterion) {
    let handles = DefaultHandleAllocator::with_arena_size("bench", ARENA_BYTES).unwrap();
    let stale: Vec<Handle<u64>> = (0..1_000)
        .map(|i| {
            let h = handles.allocate_and_construct(i);
            unsafe { handles.destroy(h) };
            h
        })
        .collect();

    c.bench_function("is_valid_stale_1000", |b| {
        b.iter(|| stale.iter().filter(|h| handles.is_valid(**h)).count());
    });
}

/// Benchmark: churn past bucket capacity into the overflow heap.
fn bench_overflow_churn(c: &mut Criterion) {
    let handles = DefaultHandleAllocator::with_arena_size("bench", 320 * 256).unwrap();

    c.bench_function("overflow_churn_512", |b| {
        b.iter(|| {
            let live: Vec<Handle<u64>> =
                (0..512).map(|i| handles.allocate_and_construct(i)).collect();
            for h in live {
                unsafe { handles.destroy(h) };
            }
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_destroy,
    bench_cast,
    bench_is_valid_stale,
    bench_overflow_churn,
);
criterion_main!(benches);
