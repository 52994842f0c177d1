//! Paged storage benchmarks.

use aolog_storage::{InMemoryPagedStorage, MmapPagedStorage, PagedStorage};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const PAGE_SIZE: u32 = 64 * 1024;
const PAGES: u64 = 64;

/// Benchmark page lookup for already created pages.
fn bench_page_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_by_offset");
    group.throughput(Throughput::Elements(1));

    let memory = InMemoryPagedStorage::new(PAGE_SIZE).unwrap();
    memory
        .page_by_offset(PAGES * PAGE_SIZE as u64 - 1)
        .unwrap();
    group.bench_function("memory", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            offset = (offset + 4099) % (PAGES * PAGE_SIZE as u64);
            black_box(memory.page_by_offset(black_box(offset)).unwrap());
        });
    });

    let dir = TempDir::new().unwrap();
    let mmap = MmapPagedStorage::open(&dir.path().join("lookup.bin"), PAGE_SIZE).unwrap();
    mmap.page_by_offset(PAGES * PAGE_SIZE as u64 - 1).unwrap();
    group.bench_function("mmap", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            offset = (offset + 4099) % (PAGES * PAGE_SIZE as u64);
            black_box(mmap.page_by_offset(black_box(offset)).unwrap());
        });
    });

    group.finish();
}

/// Benchmark creating new mapped pages.
fn bench_page_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_growth");
    group.sample_size(20);

    for pages in [1u64, 16].iter() {
        group.throughput(Throughput::Elements(*pages));
        group.bench_with_input(BenchmarkId::from_parameter(pages), pages, |b, &pages| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let storage =
                        MmapPagedStorage::open(&dir.path().join("grow.bin"), PAGE_SIZE).unwrap();
                    (dir, storage)
                },
                |(dir, storage)| {
                    for page in 0..pages {
                        black_box(storage.page_by_offset(page * PAGE_SIZE as u64).unwrap());
                    }
                    (dir, storage)
                },
                criterion::BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

/// Benchmark the atomic accessors the log uses for cursors and headers.
fn bench_atomics(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_atomics");
    group.throughput(Throughput::Elements(1));

    let storage = InMemoryPagedStorage::new(PAGE_SIZE).unwrap();
    let page = storage.page_by_offset(0).unwrap();

    group.bench_function("load_u32", |b| {
        b.iter(|| black_box(page.load_u32(black_box(64)).unwrap()));
    });

    group.bench_function("store_u32", |b| {
        let mut value = 0u32;
        b.iter(|| {
            value = value.wrapping_add(1);
            page.store_u32(black_box(64), value).unwrap();
        });
    });

    group.bench_function("fetch_add_u32", |b| {
        b.iter(|| black_box(page.fetch_add_u32(black_box(32), 1).unwrap()));
    });

    group.bench_function("compare_exchange_u64", |b| {
        b.iter(|| {
            let current = page.load_u64(16).unwrap();
            black_box(page.compare_exchange_u64(16, current, current + 4).unwrap());
        });
    });

    group.finish();
}

/// Benchmark zeroing the tail of a storage.
fn bench_zeroize(c: &mut Criterion) {
    let mut group = c.benchmark_group("zeroize_till_eof");

    for pages in [1u64, 8].iter() {
        group.throughput(Throughput::Bytes(pages * PAGE_SIZE as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), pages, |b, &pages| {
            let storage = InMemoryPagedStorage::new(PAGE_SIZE).unwrap();
            storage
                .page_by_offset(pages * PAGE_SIZE as u64 - 1)
                .unwrap();
            b.iter(|| storage.zeroize_till_eof(black_box(0)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_page_lookup,
    bench_page_growth,
    bench_atomics,
    bench_zeroize,
);

criterion_main!(benches);
