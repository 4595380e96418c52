//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant except [`CoverNotFound`](ErrorKind::CoverNotFound) is a
/// fatal parse failure: the file stays on disk untouched and the caller
/// decides whether to skip it or surface the error.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file could not be opened or is not a readable ZIP container.
    #[display("unreadable epub container: {}", _0.display())]
    Archive(#[error(not(source))] PathBuf),
    /// `META-INF/container.xml` is missing, malformed, or names no rootfile.
    #[display("epub container.xml is missing or names no rootfile")]
    Container,
    /// The OPF package document could not be located or parsed.
    #[display("package document not usable: {_0}")]
    Package(#[error(not(source))] &'static str),
    /// No cached cover image exists for the given book id.
    #[display("no cover cached for book {_0:?}")]
    CoverNotFound(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A publication file is either parseable or it isn't.
        false
    }
}
