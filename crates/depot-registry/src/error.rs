//! Registry error types.

use std::path::PathBuf;

use depot_core::ModelError;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No store with this key.
    #[error("store not found: {key}")]
    NotFound { key: String },

    /// A store with this key already exists.
    #[error("store already exists: {key}")]
    AlreadyExists { key: String },

    /// The operation is not allowed on this store.
    #[error("operation forbidden on {key}: {reason}")]
    Forbidden { key: String, reason: String },

    /// The store definition was rejected.
    #[error("invalid definition for {key}: {detail}")]
    ValidationFailed { key: String, detail: String },

    /// Another mutation of the same key held the lock too long.
    #[error("timed out after {waited_ms}ms waiting for the lock on {key}")]
    LockTimeout { key: String, waited_ms: u64 },

    /// Persistence backend failure.
    #[error("persistence error at {path}: {detail}")]
    Persistence { path: PathBuf, detail: String },

    /// Malformed key or definition.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub(crate) fn validation(key: &depot_core::StoreKey, detail: impl Into<String>) -> Self {
        RegistryError::ValidationFailed {
            key: key.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
