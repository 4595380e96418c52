//! Book catalog core for quire.
//!
//! Given a directory of EPUB and PDF files, this crate maintains an
//! indexed catalog of publications and exposes it through the capability
//! contract in [`contract`], which an OPDS/HTTP host wires to its
//! endpoints.
//!
//! # Architecture
//! Two interchangeable backends implement the same read contract:
//! - [`MemoryCatalog`] keeps the index in process memory and persists user
//!   edits in a JSON override document next to the books. The files on
//!   disk remain the source of truth.
//! - [`SqliteCatalog`] persists everything, edits included, in an embedded
//!   SQLite database with schema versioning, and can snapshot itself while
//!   live.
//!
//! Both reconcile against the filesystem at open, on demand, and (via
//! [`schedule`]) on an interval; the nightly backup loop lives there too.

mod contract;
mod discover;
pub mod error;
mod memory;
mod order;
pub mod schedule;
mod sqlite;
#[cfg(test)]
mod testutil;

pub use crate::contract::{
    Backupper, BookUpdate, Capability, Catalog, CoverProvider, CoverUpdater, Deleter, NavEntry,
    Refresher, SearchQuery, SeriesEntry, SeriesLister, SortBy, SortOrder, Updater, Uploader,
    capabilities,
};
pub use crate::memory::MemoryCatalog;
pub use crate::sqlite::SqliteCatalog;
pub use quire_extract::models::{Author, Book, BookFile};
pub use quire_library::UploadStream;

use std::path::PathBuf;
use std::sync::Arc;

/// Which backend implementation to open for a library root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-memory index with a JSON override side-file.
    Memory,
    /// Embedded SQLite store; the only backend with backup support.
    Sqlite,
}

/// Opens the catalog backend of the requested kind rooted at `root`.
/// The initial scan has completed by the time this returns.
pub async fn open(kind: BackendKind, root: impl Into<PathBuf>) -> error::Result<Arc<dyn Catalog>> {
    Ok(match kind {
        BackendKind::Memory => Arc::new(MemoryCatalog::open(root).await?),
        BackendKind::Sqlite => Arc::new(SqliteCatalog::open(root).await?),
    })
}
