use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::StorageResult;
use crate::map::Snapshot;
use crate::store::{ScopeKey, StorageBackend};

/// File-per-record backend: one JSON file per user session plus a single
/// general file, all inside one directory.
///
/// Saves write the serialized snapshot to a temp file in the same directory
/// and rename it into place, so a concurrent reader sees either the old or
/// the new record, never a torn one.
pub struct FileStorageBackend {
    dir: PathBuf,
}

impl FileStorageBackend {
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &ScopeKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.record_name()))
    }
}

impl StorageBackend for FileStorageBackend {
    fn save(&self, key: &ScopeKey, snapshot: &Snapshot) -> StorageResult<()> {
        let payload = serde_json::to_vec(snapshot)?;
        let target = self.record_path(key);
        // Temp file in the target directory keeps the rename on one filesystem.
        let tmp = self.dir.join(format!(".{}.{}.tmp", key.record_name(), Uuid::new_v4()));
        fs::write(&tmp, &payload)?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn load(&self, key: &ScopeKey) -> StorageResult<Snapshot> {
        let path = self.record_path(key);
        let payload = match fs::read(&path) {
            Ok(payload) => payload,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&payload) {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                tracing::warn!(record = %key.record_name(), error = %err,
                    "durable record is not valid JSON, starting from an empty mapping");
                Ok(Snapshot::new())
            }
        }
    }
}
