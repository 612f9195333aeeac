use crate::error::StorageResult;
use crate::map::Snapshot;
use crate::session::SessionId;

/// Identifies one durable storage record.
///
/// Every user session owns its own record; the general scope shares a single
/// fixed record across the whole process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    General,
    User(SessionId),
}

impl ScopeKey {
    /// Stable record name used by backends (file name stem, map key).
    pub fn record_name(&self) -> String {
        match self {
            ScopeKey::General => "storage_general".to_owned(),
            ScopeKey::User(id) => format!("storage_user_{}", id.as_str()),
        }
    }
}

/// Durable key-value byte-blob store for mapping snapshots.
///
/// `save` durably writes a full replacement of the record; `load` returns the
/// last saved snapshot or an empty mapping if none exists. Writes are atomic
/// from the caller's perspective: a reader never observes a partially written
/// record.
pub trait StorageBackend: Send + Sync + 'static {
    fn save(&self, key: &ScopeKey, snapshot: &Snapshot) -> StorageResult<()>;

    fn load(&self, key: &ScopeKey) -> StorageResult<Snapshot>;
}
