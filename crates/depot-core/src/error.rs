//! Model error types.

/// Errors raised while parsing or validating store definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A store key string could not be parsed.
    #[error("invalid store key '{input}': {detail}")]
    InvalidKey { input: String, detail: String },

    /// Unknown store type name.
    #[error("unknown store type: {value}")]
    InvalidStoreType { value: String },

    /// The key's store type disagrees with the store's kind.
    #[error("store {key} is declared as {declared} but its key says {actual}")]
    TypeMismatch {
        key: String,
        declared: String,
        actual: String,
    },

    /// A group lists itself as a constituent.
    #[error("group {key} cannot contain itself")]
    SelfReference { key: String },

    /// A group lists the same constituent twice.
    #[error("group {key} lists constituent {member} more than once")]
    DuplicateConstituent { key: String, member: String },

    /// A remote repository URL could not be parsed.
    #[error("invalid URL '{url}' for {key}: {detail}")]
    InvalidUrl {
        key: String,
        url: String,
        detail: String,
    },
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
