//! Performance benchmarks for stockroom-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stockroom_engine::{
    record::normalize_document, remote::decode, Collection, Document, Filter, Item, LocalStore,
    MemoryStore, RemoteItem, TypedStore,
};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

fn populated_store(rt: &Runtime, count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    rt.block_on(async {
        for i in 0..count {
            let mut item = Item::new(format!("item_{i}"), "Widget", 3, 9.99, "c1");
            item.is_synced = i % 10 != 0;
            store.put(&item).await.unwrap();
        }
    });
    store
}

fn bench_store_operations(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("store_operations");

    group.bench_function("insert", |b| {
        let store = MemoryStore::new();
        let mut id = 0u64;
        b.iter(|| {
            id += 1;
            let item = Item::new(format!("item_{id}"), "Widget", 1, 1.0, "c1");
            rt.block_on(store.put(black_box(&item)))
        })
    });

    group.bench_function("find_by_id", |b| {
        let store = populated_store(&rt, 1000);
        b.iter(|| rt.block_on(store.find_by_id(Collection::Items, black_box("item_500"))))
    });

    group.bench_function("update_fields", |b| {
        let store = populated_store(&rt, 1000);
        b.iter(|| {
            rt.block_on(store.update_fields(
                Collection::Items,
                black_box("item_500"),
                json!({"quantity": 4, "isSynced": false}),
            ))
        })
    });

    group.finish();
}

fn bench_unsynced_scan(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("unsynced_scan");

    for size in [100, 1000, 10000] {
        let store = populated_store(&rt, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| rt.block_on(store.find(Collection::Items, black_box(&Filter::unsynced()))))
        });
    }

    group.finish();
}

fn bench_translation(c: &mut Criterion) {
    let mut group = c.benchmark_group("translation");

    let item = Item::new("i1", "Widget", 3, 9.99, "c1");
    let wire = json!({
        "_id": "i1", "name": "Widget", "qty": 3,
        "selling_price": 9.99, "container_id": "c1"
    });
    let local = item.to_document().unwrap();

    group.bench_function("outbound", |b| {
        b.iter(|| serde_json::to_value(RemoteItem::from(black_box(&item))))
    });

    group.bench_function("inbound", |b| {
        b.iter(|| decode::<RemoteItem>(Collection::Items, black_box(wire.clone())).map(Item::from))
    });

    group.bench_function("normalize_local", |b| {
        b.iter(|| normalize_document(Collection::Items, black_box(&local)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_store_operations,
    bench_unsynced_scan,
    bench_translation
);
criterion_main!(benches);
