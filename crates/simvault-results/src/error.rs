use simvault_store::StoreError;
use simvault_types::{Location, TokenKey, TypeError};

/// Errors from result addressing and object-graph operations.
#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    /// Failure at the storage boundary.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A key or storage key could not be parsed.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A referenced object has no stored record.
    #[error("missing dependency {key} referenced by {referenced_by}")]
    MissingDependency {
        /// The key that could not be resolved.
        key: TokenKey,
        /// The record containing the reference.
        referenced_by: TokenKey,
    },

    /// A record exists but does not have the expected structure.
    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// No decoder is registered for this class name.
    #[error("unknown tokenizable class: {0}")]
    UnknownClass(String),

    /// The object was reconstructed but is not of the requested type.
    #[error("object {key} is not a {expected}")]
    TypeMismatch {
        key: TokenKey,
        expected: &'static str,
    },

    /// Attempted to descend below an extension node.
    #[error("{0} holds files only, not result containers")]
    NotAContainer(Location),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ResultsError {
    pub(crate) fn malformed(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for results operations.
pub type ResultsResult<T> = Result<T, ResultsError>;
