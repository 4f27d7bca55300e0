//! Benchmarks for snapshot collection and archive writing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use proc_snapshot::{Archiver, Collector, ProcessInspector, RuntimeInspector, SnapshotConfig};
use std::io;
use tempfile::TempDir;

/// Benchmark a plain snapshot of the bench process
fn bench_collect(c: &mut Criterion) {
    let collector = Collector::new();

    c.bench_function("collect", |b| {
        b.iter(|| black_box(collector.collect()));
    });
}

/// Benchmark the stack dump alone
fn bench_stack_dump(c: &mut Criterion) {
    let inspector = ProcessInspector::new();

    c.bench_function("stack_dump", |b| {
        b.iter(|| inspector.stack_dump(&mut io::sink()).unwrap());
    });
}

/// Benchmark full archives with capped heap images
fn bench_full_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_snapshot");
    group.sample_size(10);
    let temp_dir = TempDir::new().unwrap();

    let limits = vec![
        (64 * 1024, "64KB"),
        (1024 * 1024, "1MB"),
        (8 * 1024 * 1024, "8MB"),
    ];

    for (limit, name) in limits {
        let config = SnapshotConfig {
            temp_dir: Some(temp_dir.path().to_string_lossy().into_owned()),
            max_heap_dump_bytes: limit,
            ..Default::default()
        };
        let archiver = Archiver::from_config(config);
        let path = temp_dir.path().join(format!("bench_{}.zip", name));

        group.throughput(Throughput::Bytes(limit));
        group.bench_with_input(BenchmarkId::new("write_full_snapshot", name), &path, |b, path| {
            b.iter(|| archiver.write_full_snapshot(black_box(path)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collect, bench_stack_dump, bench_full_snapshot);
criterion_main!(benches);
