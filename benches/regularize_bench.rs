//! Benchmarks for series regularization
//!
//! Run with: cargo bench

use atsd_finder::series::{regularize, Sample, TimeRange};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Samples every 15 s with some jitter and a few gaps
fn create_raw_samples(count: usize) -> Vec<Sample> {
    (0..count)
        .filter(|i| i % 97 != 0)
        .map(|i| {
            let jitter = (i % 7) as i64 * 100;
            Sample::new(i as i64 * 15_000 + jitter, i as f64)
        })
        .collect()
}

/// Server-aggregated samples on an exact 60 s grid
fn create_stepped_samples(count: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| Sample::new(i as i64 * 60_000, i as f64))
        .collect()
}

fn bench_regularize(c: &mut Criterion) {
    let mut group = c.benchmark_group("regularize");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        let raw = create_raw_samples(size);
        let window = TimeRange::new(0, size as i64 * 15_000 + 60_000).unwrap();
        group.bench_function(format!("raw_{}", size), |b| {
            b.iter(|| regularize(black_box(&raw), None, window))
        });

        let stepped = create_stepped_samples(size);
        let window = TimeRange::new(0, size as i64 * 60_000 + 60_000).unwrap();
        group.bench_function(format!("stepped_{}", size), |b| {
            b.iter(|| regularize(black_box(&stepped), Some(60_000), window))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_regularize);
criterion_main!(benches);
