use tabula_protocol::{ErrorKind, ProtocolError};
use tabula_repo::RepoError;
use tabula_store::StoreError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from request handlers.
///
/// Messages name the step that failed followed by the cause, e.g.
/// `invalid data format: error reading first row of csv: EOF`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A step of a multi-step operation failed.
    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        source: BoxError,
    },

    /// A required parameter is missing.
    #[error("{0}")]
    Required(&'static str),

    /// A conflicting name or payload already exists.
    #[error("{0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Unsupported(String),

    /// Error returned by a remote node, with the class it had there.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Wrap an error as the cause of a failed `stage`.
    pub fn stage<E>(stage: &'static str) -> impl FnOnce(E) -> CoreError
    where
        E: Into<BoxError>,
    {
        move |e| CoreError::Stage {
            stage,
            source: e.into(),
        }
    }

    /// Class of the error, as sent to remote callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Remote { kind, .. } => *kind,
            _ if self.is_not_found() => ErrorKind::NotFound,
            CoreError::AlreadyExists(_) | CoreError::Repo(RepoError::NameTaken(_)) => {
                ErrorKind::AlreadyExists
            }
            CoreError::Required(_) | CoreError::Repo(RepoError::NameRequired) => {
                ErrorKind::Required
            }
            CoreError::Unsupported(_) | CoreError::Repo(RepoError::Unsupported(_)) => {
                ErrorKind::Unsupported
            }
            _ => ErrorKind::Other,
        }
    }

    /// Whether the error (or the cause of a failed stage) means something
    /// was absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            CoreError::NotFound(_) => true,
            CoreError::Remote { kind, .. } => *kind == ErrorKind::NotFound,
            CoreError::Repo(e) => e.is_not_found(),
            CoreError::Store(StoreError::NotFound(_)) => true,
            CoreError::Stage { source, .. } => {
                source
                    .downcast_ref::<RepoError>()
                    .is_some_and(RepoError::is_not_found)
                    || matches!(
                        source.downcast_ref::<StoreError>(),
                        Some(StoreError::NotFound(_))
                    )
            }
            _ => false,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
