//! The catalog contract: one core read trait plus independent optional
//! capability traits.
//!
//! Backends share identical read semantics but differ in which write
//! capabilities they expose, so a single fat interface would force every
//! backend to stub what it cannot do. Instead the host performs a runtime
//! check per capability (`as_uploader()`, `as_backupper()`, ...) and wires
//! matching endpoints only for what is actually there, answering
//! "not implemented" for the rest.

use crate::error::Result;
use async_trait::async_trait;
use quire_extract::models::{Author, Book};
use quire_library::UploadStream;
use std::path::{Path, PathBuf};

/// Read-only access to the book collection. Implemented by every backend.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Top-level navigation entries the feed layer renders.
    fn nav_entries(&self) -> Vec<NavEntry> {
        vec![
            NavEntry {
                id: "urn:quire:all-books".to_string(),
                title: "All Books".to_string(),
                content: "Browse all books in the catalog".to_string(),
                href: "/opds/books".to_string(),
                rel: "http://opds-spec.org/sort/new".to_string(),
            },
            NavEntry {
                id: "urn:quire:by-author".to_string(),
                title: "By Author".to_string(),
                content: "Browse books by author".to_string(),
                href: "/opds/authors".to_string(),
                rel: "subsection".to_string(),
            },
            NavEntry {
                id: "urn:quire:by-tag".to_string(),
                title: "By Genre".to_string(),
                content: "Browse books by genre/tag".to_string(),
                href: "/opds/tags".to_string(),
                rel: "subsection".to_string(),
            },
        ]
    }

    /// All books in the default order (most recently added first, title
    /// breaking ties case-insensitively), with the unpaginated total.
    async fn all_books(&self, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)>;

    /// A single book by its id.
    async fn book_by_id(&self, id: &str) -> Result<Book>;

    /// Filtered/sorted search; see [`SearchQuery`].
    async fn search(&self, query: SearchQuery) -> Result<(Vec<Book>, usize)>;

    /// Books whose author list contains exactly `author`, title order.
    async fn books_by_author(&self, author: &str, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)>;

    /// Books carrying exactly `tag`, title order.
    async fn books_by_tag(&self, tag: &str, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)>;

    /// Distinct author names, ordered case-insensitively.
    async fn authors(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)>;

    /// Distinct tags, ordered case-insensitively.
    async fn tags(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)>;

    // Capability discovery. Each defaults to "not supported"; backends
    // override the accessors for what they implement.

    fn as_uploader(&self) -> Option<&dyn Uploader> {
        None
    }
    fn as_cover_provider(&self) -> Option<&dyn CoverProvider> {
        None
    }
    fn as_updater(&self) -> Option<&dyn Updater> {
        None
    }
    fn as_refresher(&self) -> Option<&dyn Refresher> {
        None
    }
    fn as_series_lister(&self) -> Option<&dyn SeriesLister> {
        None
    }
    fn as_deleter(&self) -> Option<&dyn Deleter> {
        None
    }
    fn as_cover_updater(&self) -> Option<&dyn CoverUpdater> {
        None
    }
    fn as_backupper(&self) -> Option<&dyn Backupper> {
        None
    }
}

/// Accepts new publications into the library root.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Saves `src` as `filename` inside the library root, indexes it
    /// immediately, and returns the resulting book. The stream is always
    /// fully consumed or abandoned by the time this returns.
    async fn store_book(&self, filename: &str, src: UploadStream<'_>) -> Result<Book>;
}

/// Serves cached cover images by book id.
#[async_trait]
pub trait CoverProvider: Send + Sync {
    /// Filesystem path of the cached cover for `id`, or `NotFound`.
    async fn cover_path(&self, id: &str) -> Result<PathBuf>;
}

/// Edits user-visible book metadata.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Applies `update` to the book with the given id and returns the
    /// post-merge book.
    async fn update_book(&self, id: &str, update: BookUpdate) -> Result<Book>;
}

/// Re-synchronizes the index with the files on disk.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// One reconcile pass: insert newly discovered files, drop entries
    /// whose files are gone, leave everything else untouched. Idempotent
    /// on a stable disk state.
    async fn refresh(&self) -> Result<()>;
}

/// Lists distinct series with book counts.
#[async_trait]
pub trait SeriesLister: Send + Sync {
    /// All distinct non-empty series names, alphabetical, each with the
    /// number of books in it.
    async fn series(&self) -> Result<Vec<SeriesEntry>>;
}

/// Removes books from the catalog and from disk.
#[async_trait]
pub trait Deleter: Send + Sync {
    /// Removes the book from the index, then best-effort removes its
    /// file(s) and cached cover.
    async fn delete_book(&self, id: &str) -> Result<()>;
}

/// Replaces cover images with user-supplied ones.
#[async_trait]
pub trait CoverUpdater: Send + Sync {
    /// Replaces the cover for `id` with the stream contents. `ext` is the
    /// file extension including the leading dot (".jpg", ".png").
    async fn update_cover(&self, id: &str, src: UploadStream<'_>, ext: &str) -> Result<()>;
}

/// Produces consistent point-in-time snapshots of the persistent store.
#[async_trait]
pub trait Backupper: Send + Sync {
    /// Writes a self-contained snapshot named `catalog-YYYYMMDD-HHMMSS.db`
    /// into `dest_dir`, prunes all but the newest `keep` backups
    /// (`keep == 0` keeps everything), and returns the snapshot path.
    async fn backup(&self, dest_dir: &Path, keep: usize) -> Result<PathBuf>;
}

/// A navigation item pointing at a sub-feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub href: String,
    pub rel: String,
}

/// Parameters for [`Catalog::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring matched against the title or any author
    /// name. Empty matches everything.
    pub text: String,
    /// Restrict results to books not yet marked as read.
    pub unread_only: bool,
    /// Exact series name filter; empty disables the filter.
    pub series: String,
    pub sort_by: SortBy,
    /// `None` uses the natural direction of the sort field: descending for
    /// added date, ascending for title.
    pub sort_order: Option<SortOrder>,
    /// Pagination offset (0-based).
    pub offset: usize,
    /// Maximum number of results; 0 means no limit.
    pub limit: usize,
}

/// Sort field for search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// By the instant the book entered the catalog.
    #[default]
    Added,
    /// Alphabetically by title (case-insensitive).
    Title,
    /// Numerically by series position, title breaking ties. The direction
    /// is always ascending for this field.
    SeriesIndex,
}

/// Sort direction for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A partial metadata edit. `None` fields are left unchanged; `Some`
/// fields replace the current value, where `Some` of an empty string or
/// empty list is a meaningful "clear".
#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub title: Option<String>,
    /// Author names; replaces the whole list (any `uri` values are
    /// discarded by edits).
    pub authors: Option<Vec<String>>,
    /// Replaces the whole tag list.
    pub tags: Option<Vec<String>>,
    pub summary: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<String>,
    pub series_total: Option<String>,
    pub is_read: Option<bool>,
    pub rating: Option<u8>,
}

impl BookUpdate {
    /// Applies the present fields onto `book`.
    pub fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(authors) = &self.authors {
            book.authors = authors
                .iter()
                .map(|name| Author { name: name.clone(), uri: String::new() })
                .collect();
        }
        if let Some(tags) = &self.tags {
            book.tags = tags.clone();
        }
        if let Some(summary) = &self.summary {
            book.summary = summary.clone();
        }
        if let Some(publisher) = &self.publisher {
            book.publisher = publisher.clone();
        }
        if let Some(language) = &self.language {
            book.language = language.clone();
        }
        if let Some(series) = &self.series {
            book.series = series.clone();
        }
        if let Some(series_index) = &self.series_index {
            book.series_index = series_index.clone();
        }
        if let Some(series_total) = &self.series_total {
            book.series_total = series_total.clone();
        }
        if let Some(is_read) = self.is_read {
            book.is_read = is_read;
        }
        if let Some(rating) = self.rating {
            book.rating = rating;
        }
    }
}

/// A series name with its book count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    pub name: String,
    pub count: usize,
}

/// One independently advertised backend capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Always present.
    Read,
    Upload,
    ServeCover,
    UpdateMetadata,
    Delete,
    Refresh,
    UpdateCover,
    ListSeries,
    Backup,
}

/// Enumerates the capability set of a backend for the host to advertise.
pub fn capabilities(catalog: &dyn Catalog) -> Vec<Capability> {
    let mut caps = vec![Capability::Read];
    if catalog.as_uploader().is_some() {
        caps.push(Capability::Upload);
    }
    if catalog.as_cover_provider().is_some() {
        caps.push(Capability::ServeCover);
    }
    if catalog.as_updater().is_some() {
        caps.push(Capability::UpdateMetadata);
    }
    if catalog.as_deleter().is_some() {
        caps.push(Capability::Delete);
    }
    if catalog.as_refresher().is_some() {
        caps.push(Capability::Refresh);
    }
    if catalog.as_cover_updater().is_some() {
        caps.push(Capability::UpdateCover);
    }
    if catalog.as_series_lister().is_some() {
        caps.push(Capability::ListSeries);
    }
    if catalog.as_backupper().is_some() {
        caps.push(Capability::Backup);
    }
    caps
}
