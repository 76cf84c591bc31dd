//! Throughput of `RangeTokenMap::contains` under a growing population of
//! registered ranges sharing one key, the access pattern
//! `RangeLockService::is_range_blocked` drives on every acquire.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lockcore::{Endpoint, Operator, RangeToken, RangeTokenMap};

fn populated_map(entries: u64) -> RangeTokenMap<i64, ()> {
    let map = RangeTokenMap::new();
    for i in 0..entries {
        #[allow(clippy::cast_possible_wrap)]
        let value = i as i64;
        let token = RangeToken::for_read("age", Operator::Between, vec![value, value + 2]).unwrap();
        map.insert(token, ());
    }
    map
}

fn bench_contains(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_token_map_contains");
    for &entries in &[16u64, 256, 4096] {
        let map = populated_map(entries);
        group.throughput(Throughput::Elements(entries));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, _| {
            b.iter(|| {
                black_box(map.contains("age", Operator::Equals, &[Endpoint::Value(black_box(entries as i64 / 2))]));
            });
        });
    }
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("range_token_map_insert", |b| {
        b.iter_batched(
            RangeTokenMap::new,
            |map: RangeTokenMap<i64, ()>| {
                for i in 0..64i64 {
                    let token = RangeToken::for_write("age", i);
                    map.insert(black_box(token), ());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_contains, bench_insert);
criterion_main!(benches);
