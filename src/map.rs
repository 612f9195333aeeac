use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{StorageError, StorageResult};

/// Stored values are tagged variants (null, bool, number, string, sequence,
/// mapping) with a defined textual serialization.
pub type Value = serde_json::Value;

/// A consistent full copy of a mapping, the unit a flush persists.
pub type Snapshot = serde_json::Map<String, Value>;

struct MapState {
    data: RwLock<Snapshot>,
    dirty: AtomicBool,
    frozen: AtomicBool,
}

/// Shared mutable mapping with write-back dirty tracking.
///
/// All three storage scopes expose this same surface. Cloning yields another
/// handle to the same underlying map; every mutation marks the map dirty so
/// the write scheduler picks it up on its next tick. Reads never block on
/// I/O. A frozen map (browser scope after response finalization) rejects all
/// mutations with [`StorageError::StorageFrozen`].
#[derive(Clone)]
pub struct StorageMap {
    state: Arc<MapState>,
}

impl Default for StorageMap {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageMap {
    /// Creates an empty, clean mapping.
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::new())
    }

    /// Creates a mapping seeded from a loaded snapshot, clean until mutated.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: Arc::new(MapState {
                data: RwLock::new(snapshot),
                dirty: AtomicBool::new(false),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.data.read().get(key).cloned()
    }

    /// Returns the value for `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Direct access; absent keys fail with [`StorageError::KeyNotFound`].
    pub fn require(&self, key: &str) -> StorageResult<Value> {
        self.get(key)
            .ok_or_else(|| StorageError::KeyNotFound(key.to_owned()))
    }

    /// Inserts or replaces `key`, marking the map dirty.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> StorageResult<()> {
        self.ensure_mutable()?;
        self.state.data.write().insert(key.into(), value.into());
        self.mark_dirty();
        Ok(())
    }

    /// Removes `key`, returning the previous value if any.
    pub fn remove(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_mutable()?;
        let previous = self.state.data.write().remove(key);
        if previous.is_some() {
            self.mark_dirty();
        }
        Ok(previous)
    }

    /// Removes every entry.
    pub fn clear(&self) -> StorageResult<()> {
        self.ensure_mutable()?;
        let mut data = self.state.data.write();
        if !data.is_empty() {
            data.clear();
            drop(data);
            self.mark_dirty();
        }
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.data.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.data.read().keys().cloned().collect()
    }

    /// Full copy of the current content under the read lock. A flush always
    /// persists one of these, never a partially applied view.
    pub fn snapshot(&self) -> Snapshot {
        self.state.data.read().clone()
    }

    /// Read-modify-write under the write lock, so interleaved writers cannot
    /// lose updates. `f` receives the current value (if any) and returns the
    /// replacement, which is also returned to the caller.
    pub fn modify<F>(&self, key: impl Into<String>, f: F) -> StorageResult<Value>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.ensure_mutable()?;
        let key = key.into();
        let mut data = self.state.data.write();
        let next = f(data.get(&key));
        data.insert(key, next.clone());
        drop(data);
        self.mark_dirty();
        Ok(next)
    }

    /// Bulk assignment. The entries are applied immediately; the returned
    /// [`UpdateHandler`] re-applies them when invoked, so it can be attached
    /// directly as an event callback.
    pub fn update<I, K, V>(&self, entries: I) -> StorageResult<UpdateHandler>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.apply(&entries)?;
        Ok(UpdateHandler {
            map: self.clone(),
            entries,
        })
    }

    fn apply(&self, entries: &[(String, Value)]) -> StorageResult<()> {
        self.ensure_mutable()?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut data = self.state.data.write();
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        drop(data);
        self.mark_dirty();
        Ok(())
    }

    /// Rejects further mutations. Used by the browser scope once the
    /// response headers are finalized.
    pub fn freeze(&self) {
        self.state.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.state.frozen.load(Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_dirty(&self) {
        self.state.dirty.store(true, Ordering::SeqCst);
    }

    /// Clears and returns the dirty flag. The flusher snapshots *after* this
    /// swap, so a mutation racing the flush re-marks the map and is captured
    /// by the next tick instead of being lost.
    pub(crate) fn take_dirty(&self) -> bool {
        self.state.dirty.swap(false, Ordering::SeqCst)
    }

    fn ensure_mutable(&self) -> StorageResult<()> {
        if self.is_frozen() {
            return Err(StorageError::StorageFrozen);
        }
        Ok(())
    }
}

impl std::fmt::Debug for StorageMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageMap")
            .field("len", &self.len())
            .field("dirty", &self.is_dirty())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Deferred bulk assignment bound to its mapping.
///
/// Returned by [`StorageMap::update`]; invoking it re-applies the captured
/// entries, surfacing [`StorageError::StorageFrozen`] if the map has been
/// frozen in the meantime.
pub struct UpdateHandler {
    map: StorageMap,
    entries: Vec<(String, Value)>,
}

impl UpdateHandler {
    pub fn call(&self) -> StorageResult<()> {
        self.map.apply(&self.entries)
    }
}
