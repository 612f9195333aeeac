use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ambient_storage::inmemory::InMemoryBackend;
use ambient_storage::map::{Snapshot, StorageMap, Value};
use ambient_storage::store::{ScopeKey, StorageBackend};
use ambient_storage::{ScopeRegistry, SessionId, StorageConfig, StorageResult};
use serde_json::json;
use tempfile::TempDir;

fn config(dir: &TempDir) -> StorageConfig {
    StorageConfig::new()
        .with_secret("just a test")
        .with_dir(dir.path())
}

fn bump(map: &StorageMap) -> i64 {
    map.modify("count", |current| {
        json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
    })
    .expect("bump count")
    .as_i64()
    .expect("count is an integer")
}

#[test]
fn three_page_loads_count_to_three_and_persist() {
    let dir = TempDir::new().expect("temp dir");
    let registry = ScopeRegistry::new(config(&dir)).expect("registry");
    let session = SessionId::generate();

    for expected in 1..=3 {
        let user = registry.user(&session).expect("user map");
        assert_eq!(bump(&user), expected);
    }

    registry.flush_dirty();
    let record = dir
        .path()
        .join(format!("storage_user_{}.json", session.as_str()));
    let raw = std::fs::read_to_string(record).expect("user record exists");
    assert_eq!(raw, "{\"count\":3}");
}

#[test]
fn flushed_state_survives_a_process_restart() {
    let dir = TempDir::new().expect("temp dir");
    let session = SessionId::generate();

    {
        let registry = ScopeRegistry::new(config(&dir)).expect("registry");
        let user = registry.user(&session).expect("user map");
        user.insert("name", "visitor").expect("insert name");
        user.insert("count", 7).expect("insert count");
        registry.general().insert("boot", 1).expect("insert boot");
        registry.shutdown();
    }

    let registry = ScopeRegistry::new(config(&dir)).expect("fresh registry");
    let user = registry.user(&session).expect("reloaded user map");
    assert_eq!(user.get("name"), Some(json!("visitor")));
    assert_eq!(user.get("count"), Some(json!(7)));
    assert_eq!(registry.general().get("boot"), Some(json!(1)));
}

#[test]
fn flush_clears_dirty_only_on_success() {
    struct FailingBackend {
        inner: InMemoryBackend,
        failing: AtomicBool,
    }

    impl StorageBackend for FailingBackend {
        fn save(&self, key: &ScopeKey, snapshot: &Snapshot) -> StorageResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.save(key, snapshot)
        }

        fn load(&self, key: &ScopeKey) -> StorageResult<Snapshot> {
            self.inner.load(key)
        }
    }

    let backend = Arc::new(FailingBackend {
        inner: InMemoryBackend::new(),
        failing: AtomicBool::new(true),
    });
    let registry = ScopeRegistry::with_backend(
        StorageConfig::new().with_secret("just a test"),
        backend.clone(),
    )
    .expect("registry");

    let general = registry.general();
    general.insert("k", "v").expect("insert");

    assert_eq!(registry.flush_dirty(), 0, "failed write persists nothing");
    assert!(general.is_dirty(), "dirty flag stays set for retry");

    backend.failing.store(false, Ordering::SeqCst);
    assert_eq!(registry.flush_dirty(), 1, "retry succeeds");
    assert!(!general.is_dirty());

    let loaded = backend.load(&ScopeKey::General).expect("load");
    assert_eq!(loaded.get("k"), Some(&json!("v")));
}

#[test]
fn mutation_during_flush_window_is_not_lost() {
    let dir = TempDir::new().expect("temp dir");
    let registry = ScopeRegistry::new(config(&dir)).expect("registry");
    let general = registry.general();

    general.insert("a", 1).expect("insert");
    registry.flush_dirty();

    // A mutation after one flush and before the next is carried by the
    // re-marked dirty flag.
    general.insert("b", 2).expect("insert");
    assert!(general.is_dirty());
    registry.flush_dirty();

    let reloaded = ScopeRegistry::new(config(&dir)).expect("fresh registry");
    assert_eq!(reloaded.general().get("a"), Some(json!(1)));
    assert_eq!(reloaded.general().get("b"), Some(json!(2)));
}
