//! Index error types.

use std::path::PathBuf;

use depot_registry::RegistryError;

/// Errors that can occur while resolving content.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The content layer could not answer for a store.
    #[error("content check failed for {key} at {path}: {detail}")]
    Content {
        key: String,
        path: String,
        detail: String,
    },

    /// A path escapes the store root.
    #[error("invalid content path: {path}")]
    InvalidPath { path: String },

    /// Store lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
