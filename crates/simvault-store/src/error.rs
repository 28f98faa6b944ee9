use simvault_types::{Digest, Location};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested location has no data.
    #[error("resource missing at {location}: {reason}")]
    ResourceMissing { location: Location, reason: String },

    /// The stored data no longer matches the recorded digest.
    #[error(
        "hash mismatch for {location}: expected {expected}, found {actual}; \
         this object may have changed"
    )]
    ResourceChanged {
        location: Location,
        expected: Digest,
        actual: Digest,
    },

    /// The location cannot be addressed by this backend or server.
    #[error("invalid location {location}: {reason}")]
    InvalidLocation { location: Location, reason: String },

    /// The backend cannot perform this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn missing(location: &Location, reason: impl Into<String>) -> Self {
        Self::ResourceMissing {
            location: location.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(location: &Location, reason: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.clone(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`StoreError::ResourceMissing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::ResourceMissing { .. })
    }

    /// Returns `true` for [`StoreError::ResourceChanged`].
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::ResourceChanged { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
