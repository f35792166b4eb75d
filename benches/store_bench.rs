//! Criterion benchmarks for the store hot paths.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench --bench store_bench
//!
//! # Run one group
//! cargo bench --bench store_bench -- encoding
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use keyshelf::backend::encoding::{decode_key, encode_index_value, encode_key};
use keyshelf::{Engine, IndexDef, IndexQuery, Key, PageOptions, Store, StoreOptions, merge};
use serde_json::json;
use std::hint::black_box;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn seeded(rt: &Runtime, rows: i64) -> Store {
    rt.block_on(async {
        let engine = Engine::memory().unwrap();
        let store = engine
            .init("bench", StoreOptions::new().index(IndexDef::new("byN", "n")))
            .await
            .unwrap();
        for i in 0..rows {
            store.set(i, json!({"n": i % 100, "name": format!("row-{i}")})).await.unwrap();
        }
        store
    })
}

// =============================================================================
// Encoding
// =============================================================================

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let keys = [Key::Int(-42), Key::from("user:000123")];

    for key in &keys {
        let encoded = encode_key(key);
        group.bench_with_input(BenchmarkId::new("encode_key", key.type_name()), key, |b, key| {
            b.iter(|| encode_key(black_box(key)));
        });
        group.bench_with_input(
            BenchmarkId::new("decode_key", key.type_name()),
            &encoded,
            |b, bytes| b.iter(|| decode_key(black_box(bytes))),
        );
    }

    let value = json!(["tag", 17, {"nested": true}]);
    group.bench_function("encode_index_value", |b| {
        b.iter(|| encode_index_value(black_box(&value)));
    });
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let base = json!({"id": 1, "tags": ["a", "b"], "meta": {"x": 1, "y": {"z": 2}}});
    let patch = json!({"tags": ["c"], "meta": {"y": {"w": 3}}});
    c.bench_function("merge/nested", |b| {
        b.iter(|| merge(black_box(base.clone()), black_box(patch.clone())));
    });
}

// =============================================================================
// Store operations
// =============================================================================

fn bench_point_ops(c: &mut Criterion) {
    let rt = runtime();
    let store = seeded(&rt, 1_000);
    let mut group = c.benchmark_group("point");

    group.bench_function("get", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i = (i + 1) % 1_000;
            rt.block_on(store.get(i)).unwrap()
        });
    });
    group.bench_function("set", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i = (i + 1) % 1_000;
            rt.block_on(store.set(i, json!({"n": i % 100}))).unwrap()
        });
    });
    group.finish();
}

fn bench_scans(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("scan");

    for rows in [100i64, 1_000] {
        let store = seeded(&rt, rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("page", rows), &store, |b, store| {
            b.iter(|| rt.block_on(store.page(2, PageOptions::default())).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("index_above", rows), &store, |b, store| {
            b.iter(|| {
                rt.block_on(store.index("byN", IndexQuery::above(90, false)))
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encoding, bench_merge, bench_point_ops, bench_scans);
criterion_main!(benches);
