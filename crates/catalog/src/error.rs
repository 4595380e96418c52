//! Catalog Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The host layer maps these onto its wire contract:
//! `NotFound` → 404, `DuplicateUpload`/`UnsupportedType`/`Parse` → 4xx,
//! missing capability → 501, everything else → 5xx.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No book (or cached cover) with the requested id.
    #[display("book {_0:?} not found")]
    NotFound(#[error(not(source))] String),
    /// A file with the uploaded name already exists in the library root.
    #[display("file {_0:?} already exists in the library")]
    DuplicateUpload(#[error(not(source))] String),
    /// The uploaded file extension is not an accepted publication type.
    #[display("unsupported file type {_0:?} (only .epub and .pdf are accepted)")]
    UnsupportedType(#[error(not(source))] String),
    /// The publication container could not be parsed. For uploads the file
    /// stays in place; the next reconcile pass retries it.
    #[display("publication parse failed")]
    Parse,
    /// An underlying disk or database operation failed.
    #[display("storage operation failed")]
    Storage,
    /// Applying schema migrations failed.
    #[display("schema migration failed")]
    Migration,
    /// An index row that cannot be decoded back into a book. Surfaced,
    /// never masked.
    #[display("catalog integrity violation for book {_0:?}")]
    Integrity(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
