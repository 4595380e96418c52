//! Filesystem plumbing shared by the quire catalog backends.
//!
//! Backends differ in how they index books, but they walk the same library
//! root, accept the same uploads, and manage the same `.covers` cache; that
//! shared surface lives here so the backends stay focused on index
//! semantics.

pub mod covers;
pub mod error;
pub mod import;
pub mod scan;

/// A byte stream handed over by the host layer (an upload body, a cover
/// image). Borrowed mutably so the caller keeps ownership of its transport.
pub type UploadStream<'a> = &'a mut (dyn tokio::io::AsyncRead + Send + Unpin);
