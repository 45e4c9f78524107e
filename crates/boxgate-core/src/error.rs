//! Error types for the boxgate-core crate

use boxgate_driver::DriverError;
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in bridge, cursor, and bulk operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Error reported by the storage driver, passed through unchanged
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Source of a move/copy/delete does not exist
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Destination exists and the write mode forbids replacing it
    #[error("conflict at destination: {0}")]
    Conflict(String),

    /// A folder holds more entries than an interactive call may touch
    #[error("too many files: more than {limit} entries")]
    TooManyFiles { limit: usize },

    /// Path is not acceptable
    #[error("malformed path: {0}")]
    MalformedPath(String),

    /// Cursor could not be decoded
    #[error("malformed cursor: {0}")]
    MalformedCursor(String),

    /// Autorename ran out of candidates
    #[error("no available paths for {0}")]
    NoAvailableRename(String),

    /// A folder cannot be moved or copied below itself
    #[error("cannot move or copy a folder into itself: {0}")]
    IntoItself(String),

    /// Upload session id is unknown
    #[error("upload session not found: {0}")]
    UploadSessionNotFound(String),

    /// Upload session segments do not form one contiguous range from 0
    #[error("upload session incomplete: {0}")]
    IncompleteUpload(String),

    /// Batch job id is unknown
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification every error maps to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    TooManyFiles,
    MalformedPath,
    NoAvailableRename,
    Transient,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::TooManyFiles => "too_many_files",
            Self::MalformedPath => "malformed_path",
            Self::NoAvailableRename => "no_available_rename",
            Self::Transient => "transient",
            Self::Other => "other",
        }
    }
}

impl CoreError {
    /// Whether this error means "nothing is there (yet)"
    pub fn is_not_found(&self) -> bool {
        match self {
            CoreError::Driver(e) => e.is_not_found(),
            CoreError::SourceNotFound(_)
            | CoreError::UploadSessionNotFound(_)
            | CoreError::JobNotFound(_) => true,
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Driver(e) if e.is_not_found() => ErrorKind::NotFound,
            CoreError::Driver(e) => match e {
                DriverError::AlreadyExists(_)
                | DriverError::NotADirectory(_)
                | DriverError::DirectoryNotEmpty(_) => ErrorKind::Conflict,
                DriverError::InvalidPath(_) => ErrorKind::MalformedPath,
                DriverError::Backend(_) | DriverError::Io(_) => ErrorKind::Transient,
                DriverError::NotFound(_) | DriverError::NotSupported(_) => ErrorKind::Other,
            },
            CoreError::SourceNotFound(_)
            | CoreError::UploadSessionNotFound(_)
            | CoreError::JobNotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) | CoreError::IntoItself(_) => ErrorKind::Conflict,
            CoreError::TooManyFiles { .. } => ErrorKind::TooManyFiles,
            CoreError::MalformedPath(_) => ErrorKind::MalformedPath,
            CoreError::NoAvailableRename(_) => ErrorKind::NoAvailableRename,
            CoreError::MalformedCursor(_)
            | CoreError::IncompleteUpload(_)
            | CoreError::Internal(_) => ErrorKind::Other,
        }
    }
}
