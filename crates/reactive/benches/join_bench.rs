//! Benchmarks for rivulet-reactive operators.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rivulet_reactive::{ChangeSet, ChangeStream, FullJoin, Group, ImmutableGroups, LeftJoinMany, ObservableCache};

fn make_cache(size: u64) -> ObservableCache<u64, u64> {
    let cache = ObservableCache::with_capacity(size as usize);
    cache.edit(|store| {
        for i in 0..size {
            store.add(i, i * 10);
        }
    });
    cache
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for subscribers in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("single_update", subscribers),
            &subscribers,
            |b, &subscribers| {
                let cache = make_cache(100);
                let _handles: Vec<_> = (0..subscribers)
                    .map(|_| cache.preview().subscribe_fn(|changes: &ChangeSet<u64, u64>| {
                        black_box(changes.len());
                    }))
                    .collect();
                let mut value = 0u64;
                b.iter(|| {
                    value += 1;
                    cache.edit(|store| store.add_or_update(7, value));
                })
            },
        );
    }

    group.finish();
}

fn bench_full_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_join");

    for size in [100u64, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("build", size), &size, |b, &size| {
            let left = make_cache(size);
            let right = make_cache(size);
            b.iter(|| {
                let join = FullJoin::new(&left, &right, |r: &u64| r / 10, |_, l: Option<&u64>, r: Option<&u64>| {
                    l.copied().unwrap_or(0) + r.copied().unwrap_or(0)
                });
                black_box(join.output().count())
            })
        });

        group.bench_with_input(BenchmarkId::new("right_update", size), &size, |b, &size| {
            let left = make_cache(size);
            let right = make_cache(size);
            let join = FullJoin::new(&left, &right, |r: &u64| r / 10, |_, l: Option<&u64>, r: Option<&u64>| {
                l.copied().unwrap_or(0) + r.copied().unwrap_or(0)
            });
            b.iter(|| {
                right.edit(|store| store.refresh(&(size / 2)));
                black_box(join.output().count())
            })
        });
    }

    group.finish();
}

fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouping");

    for size in [100u64, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("immutable_groups", size), &size, |b, &size| {
            let source = make_cache(size);
            b.iter(|| {
                let groups = ImmutableGroups::new(&source, |v: &u64| v % 16);
                black_box(groups.output().count())
            })
        });

        group.bench_with_input(BenchmarkId::new("left_join_many_move", size), &size, |b, &size| {
            let left: ObservableCache<u64, u64> = make_cache(16);
            let right = make_cache(size);
            let join = LeftJoinMany::new(&left, &right, |v: &u64| v % 16, |_, _: &u64, g: &Group<u64, u64, u64>| {
                g.len()
            });
            let mut flip = 0u64;
            b.iter(|| {
                flip ^= 1;
                right.edit(|store| store.add_or_update(0, flip));
                black_box(join.output().count())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish, bench_full_join, bench_grouping);
criterion_main!(benches);
