//! Shared discovery plumbing for the backends' reconcile and upload paths.
//!
//! Parsing is CPU- and file-handle-bound, so everything here funnels
//! through `spawn_blocking`; the backends never parse while holding a lock
//! or a connection.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use quire_extract::models::Book;
use quire_library::scan;
use std::path::{Path, PathBuf};

/// Walks the library root on a blocking thread and returns every
/// publication file path.
pub(crate) async fn scan_root(root: &Path) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || scan::book_files(&root))
        .await
        .or_raise(|| ErrorKind::Storage)
}

/// Parses a batch of newly discovered files on a blocking thread.
/// Per-file failures only skip that file; the reconcile pass never aborts
/// because one publication is bad.
pub(crate) async fn parse_new(paths: Vec<PathBuf>, covers_dir: PathBuf) -> Result<Vec<Book>> {
    tokio::task::spawn_blocking(move || {
        paths.iter().filter_map(|path| parse_discovered(path, &covers_dir)).collect()
    })
    .await
    .or_raise(|| ErrorKind::Storage)
}

/// Parses one just-uploaded file on a blocking thread. Unlike discovery,
/// a parse failure here is surfaced to the uploader (the file stays on
/// disk for the next reconcile pass to retry).
pub(crate) async fn parse_stored(path: PathBuf, covers_dir: PathBuf) -> Result<Book> {
    tokio::task::spawn_blocking(move || {
        if scan::is_epub(&path) {
            quire_extract::parse_book(&path, &covers_dir).or_raise(|| ErrorKind::Parse)
        } else {
            Ok(quire_extract::parse_path(&path))
        }
    })
    .await
    .or_raise(|| ErrorKind::Storage)?
}

fn parse_discovered(path: &Path, covers_dir: &Path) -> Option<Book> {
    if scan::is_epub(path) {
        match quire_extract::parse_book(path, covers_dir) {
            Ok(book) => Some(book),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unparseable publication");
                None
            }
        }
    } else {
        Some(quire_extract::parse_path(path))
    }
}
