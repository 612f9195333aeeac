use std::path::PathBuf;
use std::time::Duration;

use crate::error::{missing_secret, StorageResult};

/// Startup configuration for the storage subsystem.
///
/// The secret signs session and browser cookies; it is optional only as long
/// as no user or browser storage is touched. Flush interval and retention are
/// tunables for the write scheduler and the idle-session sweep.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub(crate) secret: Option<String>,
    pub(crate) dir: PathBuf,
    pub(crate) flush_interval: Duration,
    pub(crate) retention: Option<Duration>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            secret: None,
            dir: PathBuf::from(".storage"),
            flush_interval: Duration::from_millis(500),
            retention: None,
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the secret used to sign session and browser cookies.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Sets the directory holding the durable storage records.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Sets the write-back flush interval. Sub-second values keep the window
    /// of unpersisted mutations small without touching the request path.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Enables eviction of user maps idle longer than `window`. Disabled by
    /// default; evicted maps are flushed before removal.
    pub fn with_retention(mut self, window: Duration) -> Self {
        self.retention = Some(window);
        self
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    /// Returns the configured secret or fails with a configuration error.
    /// Called by every component that signs or verifies cookies, so a missing
    /// secret surfaces at startup rather than mid-request.
    pub(crate) fn require_secret(&self) -> StorageResult<&str> {
        self.secret.as_deref().ok_or_else(missing_secret)
    }
}
