//! Benchmark for TrieMap vs standard HashMap.
//!
//! Compares the persistent trie map against Rust's standard HashMap for
//! common operations, plus persistence-specific costs (version cloning).

use atomap::persistent::TrieMap;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::HashMap;
use std::hint::black_box;

// =============================================================================
// insert Benchmark
// =============================================================================

fn benchmark_insert(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("insert");

    for size in [1_000, 10_000, 100_000] {
        group.bench_with_input(
            BenchmarkId::new("TrieMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = TrieMap::new();
                    for index in 0..size {
                        map = map.insert(black_box(index), black_box(index * 2));
                    }
                    black_box(map)
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("HashMap", size),
            &size,
            |bencher, &size| {
                bencher.iter(|| {
                    let mut map = HashMap::new();
                    for index in 0..size {
                        map.insert(black_box(index), black_box(index * 2));
                    }
                    black_box(map)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// get Benchmark
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1_000, 10_000] {
        let trie_map: TrieMap<i32, i32> = (0..size).map(|index| (index, index * 2)).collect();
        let standard_map: HashMap<i32, i32> = (0..size).map(|index| (index, index * 2)).collect();

        group.bench_with_input(BenchmarkId::new("TrieMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                for index in 0..size {
                    black_box(trie_map.get(&black_box(index)));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                for index in 0..size {
                    black_box(standard_map.get(&black_box(index)));
                }
            });
        });
    }

    group.finish();
}

// =============================================================================
// remove Benchmark
// =============================================================================

fn benchmark_remove(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("remove");

    for size in [100, 1_000, 10_000] {
        let trie_map: TrieMap<i32, i32> = (0..size).map(|index| (index, index * 2)).collect();

        group.bench_with_input(BenchmarkId::new("TrieMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut map = trie_map.clone();
                for index in 0..size {
                    map = map.remove(&black_box(index));
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

// =============================================================================
// clone Benchmark (persistence: O(1) version snapshot)
// =============================================================================

fn benchmark_clone(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("clone");

    for size in [1_000, 100_000] {
        let trie_map: TrieMap<i32, i32> = (0..size).map(|index| (index, index)).collect();
        let standard_map: HashMap<i32, i32> = (0..size).map(|index| (index, index)).collect();

        group.bench_with_input(BenchmarkId::new("TrieMap", size), &size, |bencher, _| {
            bencher.iter(|| black_box(trie_map.clone()));
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |bencher, _| {
            bencher.iter(|| black_box(standard_map.clone()));
        });
    }

    group.finish();
}

// =============================================================================
// set-algebra Benchmark
// =============================================================================

fn benchmark_set_algebra(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("set_algebra");

    for size in [1_000, 10_000] {
        let left: TrieMap<i32, i32> = (0..size).map(|index| (index, index)).collect();
        let right: TrieMap<i32, i32> = (size / 2..size + size / 2).map(|index| (index, index)).collect();

        group.bench_with_input(BenchmarkId::new("union", size), &size, |bencher, _| {
            bencher.iter(|| black_box(left.union(&right)));
        });

        group.bench_with_input(BenchmarkId::new("intersect", size), &size, |bencher, _| {
            bencher.iter(|| black_box(left.intersect(&right)));
        });

        group.bench_with_input(BenchmarkId::new("except", size), &size, |bencher, _| {
            bencher.iter(|| black_box(left.except(&right)));
        });
    }

    group.finish();
}

// =============================================================================
// iterate Benchmark
// =============================================================================

fn benchmark_iterate(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("iterate");

    for size in [1_000, 10_000] {
        let trie_map: TrieMap<i32, i32> = (0..size).map(|index| (index, index)).collect();

        group.bench_with_input(BenchmarkId::new("TrieMap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let sum: i64 = trie_map.values().map(|value| i64::from(*value)).sum();
                black_box(sum)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_insert,
    benchmark_get,
    benchmark_remove,
    benchmark_clone,
    benchmark_set_algebra,
    benchmark_iterate
);
criterion_main!(benches);
