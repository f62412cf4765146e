//! CVR fingerprint and diff benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera_protocol::{diff, fingerprint, Cvr, Fingerprint};

/// A synthetic versioned entity.
struct Entity {
    key: String,
    version: u64,
}

impl Fingerprint for Entity {
    fn collection(&self) -> &'static str {
        "progress"
    }

    fn cvr_key(&self) -> String {
        self.key.clone()
    }

    fn cvr_version(&self) -> u64 {
        self.version
    }
}

fn entities(count: usize, bump_every: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| Entity {
            key: format!("entity-{i:08}"),
            version: if bump_every > 0 && i % bump_every == 0 { 2 } else { 1 },
        })
        .collect()
}

/// Benchmark building a CVR from entities.
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for count in [10, 1_000, 100_000] {
        let input = entities(count, 0);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| black_box(fingerprint(black_box(input))));
        });
    }
    group.finish();
}

/// Benchmark diffing two CVRs where 1% of entities changed.
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for count in [10, 1_000, 100_000] {
        let base = fingerprint(&entities(count, 0));
        let next = fingerprint(&entities(count, 100));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("one_percent_changed", count),
            &(base, next),
            |b, (base, next)| b.iter(|| black_box(diff(black_box(base), black_box(next)))),
        );
    }

    let full = fingerprint(&entities(1_000, 0));
    group.bench_function("from_empty_1000", |b| {
        b.iter(|| black_box(diff(&Cvr::empty(), black_box(&full))));
    });
    group.bench_function("identical_1000", |b| {
        b.iter(|| black_box(diff(black_box(&full), black_box(&full)).is_empty()));
    });
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_diff);
criterion_main!(benches);
