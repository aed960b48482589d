use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Stored state contradicts an invariant: a missing or non-positive
    /// commit version, or content that fails its hash check.
    #[error("storage inconsistent: {0}")]
    Inconsistent(String),

    #[error("core error: {0}")]
    Core(#[from] formstore_core::CoreError),
}
