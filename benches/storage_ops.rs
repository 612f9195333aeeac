use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use ambient_storage::inmemory::InMemoryBackend;
use ambient_storage::map::StorageMap;
use ambient_storage::{ScopeRegistry, SessionId, StorageConfig};
use serde_json::json;

fn seeded_map(entries: usize) -> StorageMap {
    let map = StorageMap::new();
    for i in 0..entries {
        map.insert(format!("key-{i}"), json!(i)).expect("seed");
    }
    map
}

fn map_benches(c: &mut Criterion) {
    let map = seeded_map(64);

    c.bench_function("map_get", |b| {
        b.iter(|| {
            black_box(map.get("key-42"));
        });
    });

    c.bench_function("map_insert", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter = counter.wrapping_add(1);
            let slot = counter % 64;
            map.insert(format!("key-{slot}"), json!(counter))
                .expect("insert");
        });
    });

    c.bench_function("map_snapshot", |b| {
        b.iter(|| {
            black_box(map.snapshot());
        });
    });
}

fn flush_benches(c: &mut Criterion) {
    let registry = ScopeRegistry::with_backend(
        StorageConfig::new().with_secret("bench secret"),
        Arc::new(InMemoryBackend::new()),
    )
    .expect("registry");

    for i in 0..16 {
        let session = SessionId::generate();
        let map = registry.user(&session).expect("user map");
        map.insert("slot", json!(i)).expect("seed");
    }
    registry.flush_dirty();
    let general = registry.general();

    c.bench_function("flush_one_dirty_of_many", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter = counter.wrapping_add(1);
            general.insert("tick", json!(counter)).expect("insert");
            black_box(registry.flush_dirty());
        });
    });
}

criterion_group!(storage_ops, map_benches, flush_benches);
criterion_main!(storage_ops);
