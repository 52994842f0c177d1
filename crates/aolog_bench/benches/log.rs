//! Append-only log benchmarks.

use aolog_bench::utils::{filled_log, random_data, random_payloads};
use aolog_core::{AppendOnlyLog, LogConfig};
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const PAGE_SIZE: u32 = 1024 * 1024;
const BATCH: usize = 1_000;

/// Benchmark appends to an in-memory log.
fn bench_append_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_memory");

    for size in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes((*size * BATCH) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let data = random_data(size);
            b.iter_batched(
                || AppendOnlyLog::open_in_memory(PAGE_SIZE).unwrap(),
                |log| {
                    for _ in 0..BATCH {
                        black_box(log.append(black_box(&data)).unwrap());
                    }
                    log
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Benchmark appends to a memory-mapped file log.
fn bench_append_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_file");
    group.sample_size(30);

    for size in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes((*size * BATCH) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let data = random_data(size);
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let log = AppendOnlyLog::open_with_config(
                        &dir.path().join("bench.aolog"),
                        LogConfig::default().page_size(PAGE_SIZE),
                    )
                    .unwrap();
                    (dir, log)
                },
                |(dir, log)| {
                    for _ in 0..BATCH {
                        black_box(log.append(black_box(&data)).unwrap());
                    }
                    (dir, log)
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Benchmark appends from several threads into one log.
fn bench_append_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_concurrent");
    let data = Arc::new(random_data(64));

    for threads in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements((threads * BATCH) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                b.iter_batched(
                    || Arc::new(AppendOnlyLog::open_in_memory(PAGE_SIZE).unwrap()),
                    |log| {
                        let handles: Vec<_> = (0..threads)
                            .map(|_| {
                                let log = Arc::clone(&log);
                                let data = Arc::clone(&data);
                                thread::spawn(move || {
                                    for _ in 0..BATCH {
                                        log.append(&data).unwrap();
                                    }
                                })
                            })
                            .collect();
                        for handle in handles {
                            handle.join().unwrap();
                        }
                        log
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark random reads by id.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for size in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let (log, ids) = filled_log(&dir.path().join("read.aolog"), PAGE_SIZE, 10_000, size);
            let mut i = 0usize;

            b.iter(|| {
                i = (i + 7919) % ids.len();
                let len = log.read(black_box(ids[i]), |payload| payload.len()).unwrap();
                black_box(len);
            });
        });
    }

    group.finish();
}

/// Benchmark full iteration.
fn bench_for_each(c: &mut Criterion) {
    let mut group = c.benchmark_group("for_each_record");
    let log = AppendOnlyLog::open_in_memory(PAGE_SIZE).unwrap();
    for payload in random_payloads(100_000, 200) {
        log.append(&payload).unwrap();
    }
    group.throughput(Throughput::Elements(100_000));

    group.bench_function("100k_mixed", |b| {
        b.iter(|| {
            let mut total = 0usize;
            log.for_each_record(|_, payload| {
                total += payload.len();
                true
            })
            .unwrap();
            black_box(total);
        });
    });

    group.finish();
}

/// Benchmark reopening a log that needs recovery.
fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(20);

    group.bench_function("reopen_after_crash_10k", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let path = dir.path().join("crash.aolog");
                let (log, _) = filled_log(&path, PAGE_SIZE, 10_000, 64);
                // Stall the committed cursor at the first record.
                let _ = log.append_with(8, |_| Err(std::io::Error::other("abandoned")));
                for _ in 0..10_000 {
                    log.append(&[0u8; 64]).unwrap();
                }
                std::mem::forget(log);
                (dir, path)
            },
            |(dir, path)| {
                let log = AppendOnlyLog::open_with_config(
                    &path,
                    LogConfig::default().page_size(PAGE_SIZE),
                )
                .unwrap();
                assert!(log.was_recovery_needed());
                (dir, log)
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append_memory,
    bench_append_file,
    bench_append_concurrent,
    bench_read,
    bench_for_each,
    bench_recovery,
);

criterion_main!(benches);
