//! AutoProx error types.

use std::path::PathBuf;

use depot_registry::RegistryError;

/// Errors from rule management and rule execution.
#[derive(Debug, thiserror::Error)]
pub enum AutoProxError {
    /// A rule failed while producing a store.
    #[error("rule '{rule}' failed for {key}: {detail}")]
    RuleExecution {
        rule: String,
        key: String,
        detail: String,
    },

    /// A rule spec could not be parsed.
    #[error("invalid rule '{name}': {detail}")]
    InvalidRule { name: String, detail: String },

    /// No rule with this name.
    #[error("no rule named '{name}'")]
    RuleNotFound { name: String },

    /// Rule storage failure.
    #[error("cannot access rule file {path}: {source}")]
    RuleFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type alias for AutoProx operations.
pub type Result<T> = std::result::Result<T, AutoProxError>;
