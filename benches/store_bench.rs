//! Benchmarks for valuestore operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;
use valuestore::{DataStore, StoreConfig};

fn open_store(dir: &TempDir) -> DataStore {
    let config = StoreConfig::builder().data_dir(dir.path()).name("bench").build();
    DataStore::open(config).unwrap()
}

fn payload(i: u32) -> Vec<u8> {
    format!("http://example.org/resource/{}", i).into_bytes()
}

fn store_benchmarks(c: &mut Criterion) {
    // Fresh inserts of distinct values
    c.bench_function("store_data_new_1000", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |dir| {
                let store = open_store(&dir);
                for i in 0..1000 {
                    black_box(store.store_data(&payload(i)).unwrap());
                }
            },
            BatchSize::PerIteration,
        )
    });

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    for i in 0..10_000 {
        store.store_data(&payload(i)).unwrap();
    }

    // Duplicate inserts hit the hash index and write nothing
    c.bench_function("store_data_duplicate", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(store.store_data(&payload(i)).unwrap())
        })
    });

    c.bench_function("get_id", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 7) % 10_000;
            black_box(store.get_id(&payload(i)).unwrap())
        })
    });

    c.bench_function("get_data", |b| {
        let mut id = 0u32;
        b.iter(|| {
            id = id % 10_000 + 1;
            black_box(store.get_data(id).unwrap())
        })
    });
}

criterion_group!(benches, store_benchmarks);
criterion_main!(benches);
