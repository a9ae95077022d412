//! Benchmarks for kival storage operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use kival::{Config, Engine, SyncStrategy};
use tempfile::TempDir;

fn open_engine(sync_strategy: SyncStrategy) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .max_segment_size(4 * 1024 * 1024)
        .sync_strategy(sync_strategy)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn storage_benchmarks(c: &mut Criterion) {
    let value = vec![0xABu8; 128];

    // Single key write throughput, every append fsynced
    c.bench_function("put_sync_every_write", |b| {
        let (_temp, engine) = open_engine(SyncStrategy::EveryWrite);
        let mut i = 0u64;
        b.iter(|| {
            engine.put(format!("key{}", i).as_bytes(), &value).unwrap();
            i += 1;
        });
    });

    // Batched sync
    c.bench_function("put_sync_every_100", |b| {
        let (_temp, engine) = open_engine(SyncStrategy::EveryNWrites { count: 100 });
        let mut i = 0u64;
        b.iter(|| {
            engine.put(format!("key{}", i).as_bytes(), &value).unwrap();
            i += 1;
        });
    });

    // Random-ish read throughput over a populated store
    c.bench_function("get_10k_keys", |b| {
        let (_temp, engine) = open_engine(SyncStrategy::EveryNWrites { count: 1000 });
        for i in 0..10_000u64 {
            engine.put(format!("key{}", i).as_bytes(), &value).unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key{}", (i * 7919) % 10_000);
            engine.get(key.as_bytes()).unwrap();
            i += 1;
        });
    });

    // Compaction of a store where most records are dead
    c.bench_function("compact_1k_live_of_10k", |b| {
        b.iter_batched(
            || {
                let (temp, engine) = open_engine(SyncStrategy::EveryNWrites { count: 1000 });
                for round in 0..10u64 {
                    for i in 0..1_000u64 {
                        let v = format!("value{}-{}", i, round);
                        engine.put(format!("key{}", i).as_bytes(), v.as_bytes()).unwrap();
                    }
                }
                (temp, engine)
            },
            |(_temp, engine)| {
                engine.compact().unwrap();
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
