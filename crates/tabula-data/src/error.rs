/// Errors from format detection, validation and row encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataError {
    #[error("no file extension provided")]
    NoExtension,

    #[error("unsupported file type: '{0}'")]
    UnsupportedFormat(String),

    /// The payload is not well formed for its format.
    #[error("{0}")]
    InvalidData(String),

    /// The structure is unusable (missing schema, duplicate field names, ...).
    #[error("{0}")]
    InvalidStructure(String),

    /// A single row failed to read or convert.
    #[error("row {row}: {reason}")]
    Row { row: usize, reason: String },

    #[error("encode error: {0}")]
    Encode(String),
}

/// Result alias for data operations.
pub type DataResult<T> = Result<T, DataError>;
