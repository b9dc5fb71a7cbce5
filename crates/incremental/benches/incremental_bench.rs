//! Benchmarks for rivulet-incremental stores.

use rivulet_incremental::{ChangeAwareCache, ChangeAwareList};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn make_cache(size: u64) -> ChangeAwareCache<u64, u64> {
    let mut cache = ChangeAwareCache::with_capacity(size as usize);
    for i in 0..size {
        cache.add(i, i * 10);
    }
    cache.capture_changes();
    cache
}

fn bench_cache_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    for size in [10u64, 100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("add_or_update", size), &size, |b, &size| {
            b.iter(|| {
                let mut cache = ChangeAwareCache::new();
                for i in 0..size {
                    cache.add_or_update(i, black_box(i));
                }
                cache.capture_changes()
            })
        });

        group.bench_with_input(BenchmarkId::new("refresh_all", size), &size, |b, &size| {
            let mut cache = make_cache(size);
            b.iter(|| {
                cache.refresh_all();
                cache.capture_changes()
            })
        });
    }

    group.finish();
}

fn bench_cache_clone_changes(c: &mut Criterion) {
    let mut group = c.benchmark_group("clone_changes");

    for size in [100u64, 1000, 10000] {
        let mut source = ChangeAwareCache::new();
        for i in 0..size {
            source.add_or_update(i, i);
        }
        for i in (0..size).step_by(3) {
            source.add_or_update(i, i + 1);
        }
        let changes = source.capture_changes();

        group.bench_with_input(BenchmarkId::new("replay", size), &changes, |b, changes| {
            b.iter(|| {
                let mut mirror = ChangeAwareCache::new();
                mirror.clone_changes(black_box(changes));
                mirror.capture_changes()
            })
        });
    }

    group.finish();
}

fn bench_cache_edit_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_diff");

    for size in [100u64, 1000, 10000] {
        let next: Vec<(u64, u64)> = (size / 2..size + size / 2).map(|i| (i, i * 10)).collect();

        group.bench_with_input(BenchmarkId::new("half_overlap", size), &next, |b, next| {
            b.iter(|| {
                let mut cache = make_cache(size);
                cache.edit_diff(next.iter().copied(), |a, b| a == b);
                cache.capture_changes()
            })
        });
    }

    group.finish();
}

fn bench_list_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");

    for size in [100usize, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("add_range", size), &size, |b, &size| {
            b.iter(|| {
                let mut list = ChangeAwareList::with_capacity(size);
                list.add_range(0..black_box(size));
                list.capture_changes()
            })
        });

        group.bench_with_input(BenchmarkId::new("move_front_to_back", size), &size, |b, &size| {
            let mut list = ChangeAwareList::from_vec((0..size).collect::<Vec<_>>());
            b.iter(|| {
                list.move_item(0, size - 1).unwrap();
                list.capture_changes()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_edits,
    bench_cache_clone_changes,
    bench_cache_edit_diff,
    bench_list_edits,
);
criterion_main!(benches);
