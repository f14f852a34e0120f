// Store performance benchmarks.
// Covers the hot paths most likely to be touched by real callers: a
// freshly inserted key, an in-place update, and a full bucket-table scan.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kvhash::Store;
use tempfile::TempDir;

fn open_store(name: &str) -> (Store, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    let store = Store::open(path.to_str().unwrap()).unwrap();
    (store, dir)
}

fn bench_put_fresh_keys(c: &mut Criterion) {
    c.bench_function("put_fresh_keys", |b| {
        let (mut store, _dir) = open_store("put_bench");
        let mut i: u64 = 0;
        b.iter(|| {
            let key = format!("key-{i}");
            store.put(black_box(key.as_bytes()), black_box(b"some benchmark value")).unwrap();
            i += 1;
        });
    });
}

fn bench_put_in_place_update(c: &mut Criterion) {
    let (mut store, _dir) = open_store("update_bench");
    store.put(b"hot-key", b"0123456789").unwrap();

    c.bench_function("put_in_place_update", |b| {
        b.iter(|| {
            store.put(black_box(b"hot-key"), black_box(b"01234")).unwrap();
        });
    });
}

fn bench_get(c: &mut Criterion) {
    let (mut store, _dir) = open_store("get_bench");
    for i in 0..1000u32 {
        store.put(format!("key-{i}").as_bytes(), b"value").unwrap();
    }

    c.bench_function("get_hit", |b| {
        b.iter(|| {
            black_box(store.get(black_box(b"key-500")).unwrap());
        });
    });
}

fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_scan");

    for count in [100usize, 1_000] {
        let (mut store, _dir) = open_store(&format!("scan_bench_{count}"));
        for i in 0..count {
            store.put(format!("key-{i}").as_bytes(), b"value").unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                store.rewind();
                let mut seen = 0usize;
                while store.next_record().unwrap().is_some() {
                    seen += 1;
                }
                black_box(seen);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put_fresh_keys, bench_put_in_place_update, bench_get, bench_full_scan);
criterion_main!(benches);
