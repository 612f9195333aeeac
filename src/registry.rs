use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

use crate::ambient::AmbientContext;
use crate::config::StorageConfig;
use crate::cookie::{self, CookieSigner};
use crate::error::StorageResult;
use crate::file_store::FileStorageBackend;
use crate::map::{Snapshot, StorageMap};
use crate::session::{SessionId, SessionResolver};
use crate::store::{ScopeKey, StorageBackend};

struct UserSlot {
    map: StorageMap,
    last_access: Mutex<OffsetDateTime>,
}

impl UserSlot {
    fn new(map: StorageMap, now: OffsetDateTime) -> Self {
        Self {
            map,
            last_access: Mutex::new(now),
        }
    }

    fn touch(&self, now: OffsetDateTime) {
        *self.last_access.lock() = now;
    }

    fn idle_since(&self, now: OffsetDateTime) -> Duration {
        now - *self.last_access.lock()
    }
}

struct RegistryInner {
    config: StorageConfig,
    backend: Arc<dyn StorageBackend>,
    general: StorageMap,
    users: DashMap<SessionId, UserSlot>,
    // Serializes flush execution so two flushes of the same mapping never
    // interleave partial-snapshot writes.
    flush_lock: Mutex<()>,
}

/// Process-wide owner of the general map and the per-session user maps.
///
/// Created explicitly at application startup and passed by reference to the
/// request-handling layer; torn down with [`ScopeRegistry::shutdown`]. The
/// general map is loaded once at construction; user maps load lazily on first
/// access and may be evicted after the configured retention window.
#[derive(Clone)]
pub struct ScopeRegistry {
    inner: Arc<RegistryInner>,
}

impl ScopeRegistry {
    /// Builds a registry over the file backend in `config.dir`.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        let backend = Arc::new(FileStorageBackend::new(config.dir.clone())?);
        Self::with_backend(config, backend)
    }

    /// Builds a registry over a caller-supplied backend.
    pub fn with_backend(
        config: StorageConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> StorageResult<Self> {
        let general = StorageMap::from_snapshot(backend.load(&ScopeKey::General)?);
        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                backend,
                general,
                users: DashMap::new(),
                flush_lock: Mutex::new(()),
            }),
        })
    }

    /// The process-wide shared mapping, visible to every session.
    pub fn general(&self) -> StorageMap {
        self.inner.general.clone()
    }

    /// The mapping bound to `session`, loading its durable record on first
    /// access. All concurrent requests sharing the identifier see one map.
    pub fn user(&self, session: &SessionId) -> StorageResult<StorageMap> {
        let now = OffsetDateTime::now_utc();
        if let Some(slot) = self.inner.users.get(session) {
            slot.touch(now);
            return Ok(slot.map.clone());
        }
        let snapshot = self.inner.backend.load(&ScopeKey::User(session.clone()))?;
        let slot = self
            .inner
            .users
            .entry(session.clone())
            .or_insert_with(|| UserSlot::new(StorageMap::from_snapshot(snapshot), now));
        slot.touch(now);
        Ok(slot.map.clone())
    }

    /// Server-side cleanup: drops the in-memory map for `session` and
    /// persists an empty record in its place.
    pub fn clear_user(&self, session: &SessionId) -> StorageResult<()> {
        self.inner.users.remove(session);
        self.inner
            .backend
            .save(&ScopeKey::User(session.clone()), &Snapshot::new())
    }

    /// Number of user maps currently loaded in memory.
    pub fn loaded_users(&self) -> usize {
        self.inner.users.len()
    }

    /// Builds the session resolver for this registry's configuration.
    pub fn resolver(&self) -> StorageResult<SessionResolver> {
        SessionResolver::new(&self.inner.config)
    }

    /// Decodes the inbound browser cookie into a mapping; absent or invalid
    /// cookies start empty.
    pub fn decode_browser_cookie(&self, cookie_value: Option<&str>) -> StorageResult<StorageMap> {
        let signer = self.signer()?;
        Ok(cookie::decode_browser(&signer, cookie_value))
    }

    /// Serializes a browser mapping into its outgoing signed cookie.
    pub fn encode_browser_cookie(&self, map: &StorageMap) -> StorageResult<String> {
        let signer = self.signer()?;
        cookie::encode_browser(&signer, map)
    }

    /// Binds the ambient context the request layer installs for the duration
    /// of a request. The returned handle is what spawned background tasks
    /// inherit.
    pub fn bind(&self, session: SessionId, browser: StorageMap) -> AmbientContext {
        AmbientContext::new(self.clone(), session, browser)
    }

    /// Flushes every dirty loaded mapping, returning how many were written.
    ///
    /// A failed write logs a warning and re-marks the mapping dirty so the
    /// next tick retries; in-memory operation is unaffected.
    pub fn flush_dirty(&self) -> usize {
        let _guard = self.inner.flush_lock.lock();
        let mut written = 0;
        if self.flush_map(&ScopeKey::General, &self.inner.general) {
            written += 1;
        }
        for entry in self.inner.users.iter() {
            if self.flush_map(&ScopeKey::User(entry.key().clone()), &entry.value().map) {
                written += 1;
            }
        }
        if written > 0 {
            tracing::debug!(written, "flushed dirty storage mappings");
        }
        written
    }

    fn flush_map(&self, key: &ScopeKey, map: &StorageMap) -> bool {
        if !map.take_dirty() {
            return false;
        }
        let snapshot = map.snapshot();
        match self.inner.backend.save(key, &snapshot) {
            Ok(()) => true,
            Err(err) => {
                map.mark_dirty();
                tracing::warn!(record = %key.record_name(), error = %err,
                    "flush failed, mapping stays dirty for retry");
                false
            }
        }
    }

    /// Evicts user maps idle beyond the retention window, flushing each one
    /// a final time before removal. No-op when retention is not configured.
    pub fn evict_idle(&self) {
        let Some(retention) = self.inner.config.retention else {
            return;
        };
        let retention = Duration::try_from(retention).unwrap_or(Duration::MAX);
        let now = OffsetDateTime::now_utc();
        let stale: Vec<SessionId> = self
            .inner
            .users
            .iter()
            .filter(|entry| entry.value().idle_since(now) >= retention)
            .map(|entry| entry.key().clone())
            .collect();
        if stale.is_empty() {
            return;
        }
        let _guard = self.inner.flush_lock.lock();
        for session in &stale {
            if let Some((session, slot)) = self.inner.users.remove(session) {
                self.flush_map(&ScopeKey::User(session), &slot.map);
            }
        }
        tracing::info!(evicted = stale.len(), "evicted idle user storage mappings");
    }

    /// Final synchronous flush. Called on shutdown so no dirty mapping is
    /// lost; safe to call repeatedly.
    pub fn shutdown(&self) {
        let written = self.flush_dirty();
        tracing::debug!(written, "storage registry shut down");
    }

    pub(crate) fn flush_interval(&self) -> std::time::Duration {
        self.inner.config.flush_interval
    }

    fn signer(&self) -> StorageResult<CookieSigner> {
        Ok(CookieSigner::new(self.inner.config.require_secret()?))
    }
}
