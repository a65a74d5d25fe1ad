//! Benchmarks for mapkv engine operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use mapkv::{Engine, Options};
use tempfile::TempDir;

const KEYS: u64 = 10_000;
const VALUE: [u8; 128] = [0x5a; 128];

fn key(i: u64) -> Vec<u8> {
    format!("{:016}", i).into_bytes()
}

fn open(dir: &TempDir, index: bool) -> Engine {
    let data = dir.path().join("bench.db");
    let index_path = dir.path().join("bench.idx");
    let options = Options::builder().tables(64).buckets(64).build();
    Engine::open(&data, index.then_some(index_path.as_path()), &options).unwrap()
}

fn populated(dir: &TempDir) -> Engine {
    let mut engine = open(dir, false);
    for i in 0..KEYS {
        engine.put(&key(i), &VALUE).unwrap();
    }
    engine
}

fn storage_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(KEYS));

    for (name, split) in [("put_combined", false), ("put_split", true)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let engine = open(&dir, split);
                    (dir, engine)
                },
                |(_dir, mut engine)| {
                    for i in 0..KEYS {
                        engine.put(&key(i), &VALUE).unwrap();
                    }
                },
                BatchSize::PerIteration,
            )
        });
    }

    let dir = TempDir::new().unwrap();
    let engine = populated(&dir);
    let keys: Vec<Vec<u8>> = (0..KEYS).map(key).collect();
    let mut buf = [0u8; 128];

    group.bench_function("get_hit", |b| {
        b.iter(|| {
            for k in &keys {
                black_box(engine.get_into(k, &mut buf).unwrap());
            }
        })
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| {
            for i in KEYS..KEYS * 2 {
                black_box(engine.get_into(&key(i), &mut buf).unwrap());
            }
        })
    });

    group.bench_function("iterate", |b| {
        b.iter(|| black_box(engine.entries().count()))
    });

    group.finish();
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
