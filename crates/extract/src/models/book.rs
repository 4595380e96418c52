use std::path::PathBuf;
use time::{Date, UtcDateTime};

/// Media type recorded for EPUB acquisition files.
pub const EPUB_MIME: &str = "application/epub+zip";
/// Media type recorded for PDF acquisition files.
pub const PDF_MIME: &str = "application/pdf";
/// Media type recorded for files with an unrecognized extension.
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// A publication in the catalog.
///
/// Optional text fields use the empty string for "unset"; this keeps the
/// override semantics simple, where present-but-empty is a meaningful
/// user edit distinct from "no edit".
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    /// Stable identifier derived from the file path alone
    /// (see [`path_to_id`](crate::path_to_id)).
    pub id: String,
    /// Display title; falls back to the filename stem when the package
    /// provides none.
    pub title: String,
    /// Authors in package order (may be empty).
    pub authors: Vec<Author>,
    /// Short description of the publication.
    pub summary: String,
    /// BCP 47 language tag (e.g. "en", "fr").
    pub language: String,
    /// Publisher name.
    pub publisher: String,
    /// Original publication date; `None` if unknown or unparseable.
    pub published: Option<Date>,
    /// Instant of the last catalog mutation for this book.
    pub updated_at: UtcDateTime,
    /// Instant the file first entered the catalog (file modification time
    /// at discovery, falling back to the discovery instant).
    pub added_at: UtcDateTime,
    /// Genre/subject tags.
    pub tags: Vec<String>,
    /// Series name this book belongs to.
    pub series: String,
    /// Position within the series as a decimal string ("1", "2.5").
    pub series_index: String,
    /// Total number of books in the series, if known.
    pub series_total: String,
    /// User flag: the book has been read.
    pub is_read: bool,
    /// User star rating, 0 (unrated) to 5.
    pub rating: u8,
    /// URL path to the cached cover image, if one exists.
    pub cover_url: String,
    /// URL path to the thumbnail image; points at the same cached file.
    pub thumbnail_url: String,
    /// Acquisition files; exactly one entry for books indexed by this crate.
    pub files: Vec<BookFile>,
}

/// A publication author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    /// Optional reference URI; usually empty and discarded on user edits.
    pub uri: String,
}

/// A downloadable file associated with a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFile {
    /// Media type (e.g. [`EPUB_MIME`]).
    pub mime_type: String,
    /// Filesystem path to the file.
    pub path: PathBuf,
    /// File size in bytes (0 if unknown).
    pub size: u64,
}
