//! Canonical encoding and hash-chain benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memogarden_bench::{chain, payload};
use memogarden_core::hash::{compute_hash, to_canonical_json, verify_chain};

/// Benchmark canonical JSON encoding by payload size.
fn bench_canonical(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonical_json");

    for fields in [4, 32, 256].iter() {
        let value = payload(*fields, 32);
        let size = to_canonical_json(&value).len();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &value, |b, value| {
            b.iter(|| black_box(to_canonical_json(black_box(value))));
        });
    }
    group.finish();
}

/// Benchmark hashing a version with and without a predecessor.
fn bench_compute_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_hash");
    let value = payload(16, 32);
    let previous = compute_hash(&value, None);

    group.bench_function("genesis", |b| {
        b.iter(|| black_box(compute_hash(black_box(&value), None)));
    });
    group.bench_function("linked", |b| {
        b.iter(|| black_box(compute_hash(black_box(&value), Some(&previous))));
    });
    group.finish();
}

/// Benchmark full-chain verification.
fn bench_verify_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_chain");

    for len in [1, 10, 100, 1000].iter() {
        let records = chain(*len);
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &records, |b, records| {
            b.iter(|| black_box(verify_chain(black_box(records))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_canonical, bench_compute_hash, bench_verify_chain);

criterion_main!(benches);
