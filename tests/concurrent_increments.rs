use std::time::Duration;

use ambient_storage::map::Value;
use ambient_storage::{ambient, ScopeRegistry, SessionId, StorageConfig};
use serde_json::json;
use tempfile::TempDir;

fn build_registry(dir: &TempDir) -> ScopeRegistry {
    let config = StorageConfig::new()
        .with_secret("just a test")
        .with_dir(dir.path());
    ScopeRegistry::new(config).expect("registry")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_increments_converge_to_the_request_count() {
    const REQUESTS: i64 = 32;

    let dir = TempDir::new().expect("temp dir");
    let registry = build_registry(&dir);
    let session = SessionId::generate();

    // Each task plays one request bound to the same session.
    let mut handles = Vec::new();
    for _ in 0..REQUESTS {
        let browser = registry
            .decode_browser_cookie(None)
            .expect("empty browser map");
        let ctx = registry.bind(session.clone(), browser);
        handles.push(ctx.spawn(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            ambient::user()
                .expect("user map")
                .modify("count", |current| {
                    json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
                })
                .expect("increment");
        }));
    }
    for handle in handles {
        handle.await.expect("request task");
    }

    let user = registry.user(&session).expect("user map");
    assert_eq!(user.get("count"), Some(json!(REQUESTS)), "no lost updates");

    registry.flush_dirty();
    let reloaded = build_registry(&dir);
    let user = reloaded.user(&session).expect("reloaded user map");
    assert_eq!(user.get("count"), Some(json!(REQUESTS)));
}

#[tokio::test]
async fn one_session_means_one_shared_map_across_requests() {
    let dir = TempDir::new().expect("temp dir");
    let registry = build_registry(&dir);
    let session = SessionId::generate();

    let first = registry.user(&session).expect("first request");
    let second = registry.user(&session).expect("second request");
    first.insert("seen", true).expect("insert");
    assert_eq!(second.get("seen"), Some(json!(true)));
    assert_eq!(registry.loaded_users(), 1);
}
