//! Error types for the boxgate-driver crate

use thiserror::Error;

/// Result type alias using `DriverError`
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors a storage driver can report
#[derive(Error, Debug)]
pub enum DriverError {
    /// Nothing exists at the path
    #[error("not found: {0}")]
    NotFound(String),

    /// Something of the wrong kind already occupies the path
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory, found a file
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Directory still has children
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path is not usable by this backend
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The driver does not implement an optional operation
    #[error("operation not supported by driver: {0}")]
    NotSupported(&'static str),

    /// Backend-specific failure (network, service error, ...)
    #[error("backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Whether this error means "nothing is there (yet)"
    pub fn is_not_found(&self) -> bool {
        match self {
            DriverError::NotFound(_) => true,
            DriverError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
