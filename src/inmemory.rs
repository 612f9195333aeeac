use dashmap::DashMap;

use crate::error::StorageResult;
use crate::map::Snapshot;
use crate::store::{ScopeKey, StorageBackend};

/// In-memory backend backed by a concurrent hash map.
///
/// Durability ends with the process; useful for tests and for embedders that
/// only want request-lifetime coalescing without disk records.
#[derive(Default)]
pub struct InMemoryBackend {
    records: DashMap<String, Snapshot>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl StorageBackend for InMemoryBackend {
    fn save(&self, key: &ScopeKey, snapshot: &Snapshot) -> StorageResult<()> {
        self.records.insert(key.record_name(), snapshot.clone());
        Ok(())
    }

    fn load(&self, key: &ScopeKey) -> StorageResult<Snapshot> {
        Ok(self
            .records
            .get(&key.record_name())
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_are_isolated_by_key() {
        let backend = InMemoryBackend::new();
        let mut snapshot = Snapshot::new();
        snapshot.insert("count".into(), json!(1));
        backend.save(&ScopeKey::General, &snapshot).expect("save");

        let general = backend.load(&ScopeKey::General).expect("load general");
        assert_eq!(general, snapshot);

        let user = backend
            .load(&ScopeKey::User(crate::SessionId::generate()))
            .expect("load user");
        assert!(user.is_empty());
    }
}
