//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally: reject the request (`Unsupported`, `Duplicate`) or report a
/// storage failure (`Io`).
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The upload's file extension is not an accepted publication type.
    #[display("unsupported file type {_0:?} (only .epub and .pdf are accepted)")]
    Unsupported(#[error(not(source))] String),
    /// A file with the destination name already exists in the library root.
    #[display("file {_0:?} already exists in the library")]
    Duplicate(#[error(not(source))] String),
    /// An underlying filesystem operation failed.
    #[display("filesystem error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}
