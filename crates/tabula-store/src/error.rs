use tabula_types::ContentKey;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ContentKey),

    /// Content hash mismatch on read or fetch.
    #[error("hash mismatch for {key}: computed {computed}")]
    HashMismatch { key: ContentKey, computed: String },

    /// The key does not address an object in this store.
    #[error("invalid key {key}: {reason}")]
    InvalidKey { key: ContentKey, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object data is malformed or of the wrong kind.
    #[error("corrupt object {key}: {reason}")]
    CorruptObject { key: ContentKey, reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
