//! Error types for APPX packaging operations.

use thiserror::Error;

/// Result type for packaging operations
pub type PackagingResult<T> = Result<T, PackagingError>;

/// Error taxonomy for the packaging pipeline. Nothing is retried; the first
/// error propagates to the caller, which reports it and exits non-zero.
#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("value {value} does not fit in the {field} field")]
    Range { field: &'static str, value: u64 },

    #[error("content error: {0}")]
    Content(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for PackagingError {
    fn from(error: std::io::Error) -> Self {
        PackagingError::Io(error.to_string())
    }
}

impl From<openssl::error::ErrorStack> for PackagingError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        PackagingError::Signing(error.to_string())
    }
}

impl From<cryptoki::error::Error> for PackagingError {
    fn from(error: cryptoki::error::Error) -> Self {
        PackagingError::Signing(error.to_string())
    }
}
