use thiserror::Error;

/// Errors surfaced by the storage subsystem.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Direct access to a key that is not present in the mapping.
    #[error("key {0:?} not found in storage")]
    KeyNotFound(String),

    /// Mutation of browser storage after the response has been finalized.
    #[error("browser storage is immutable: the response to the browser has already been built")]
    StorageFrozen,

    /// An ambient accessor was used without a bound request or captured context.
    #[error("no active request context: storage was accessed outside a bound request scope")]
    NoActiveContext,

    /// Missing or invalid startup configuration.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Persistence backend I/O failure. The dirty flag stays set so a later
    /// flush retries; in-memory operation continues.
    #[error("storage backend I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot or cookie payload could not be encoded or decoded.
    #[error("storage payload encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub(crate) fn missing_secret() -> StorageError {
    StorageError::Configuration(
        "a signing secret is required before user or browser storage can be used".into(),
    )
}
