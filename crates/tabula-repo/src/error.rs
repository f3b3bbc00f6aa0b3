//! Error types for repository operations.

use tabula_store::StoreError;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A name, path, record or peer is absent.
    #[error("repo: not found: {0}")]
    NotFound(String),

    /// An operation needed a name and got an empty one.
    #[error("repo: name is required")]
    NameRequired,

    /// The name is already bound to a path.
    #[error("repo: name '{0}' already exists")]
    NameTaken(String),

    /// The name does not match `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The repo does not offer this capability.
    #[error("repo: {0} is not supported")]
    Unsupported(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepoError::NotFound(_) | RepoError::Store(StoreError::NotFound(_))
        )
    }
}

/// Convenience type alias for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;
