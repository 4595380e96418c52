//! In-memory catalog backend.
//!
//! The whole index lives in process memory and is rebuilt from the library
//! root by reconciling against the disk; user edits live out-of-band in a
//! JSON override document so they survive rescans and restarts. One
//! reader/writer lock guards the index and the override map together.
//! Reads take the shared mode; mutations take the exclusive mode. The
//! reconcile path does all scanning and parsing before the exclusive lock
//! and only applies its changeset under it, which keeps read latency
//! bounded for large libraries.

mod overrides;

use crate::contract::{
    BookUpdate, Catalog, CoverProvider, CoverUpdater, Deleter, Refresher, SearchQuery, SeriesEntry,
    SeriesLister, Updater, Uploader,
};
use crate::discover;
use crate::error::{ErrorKind, Result};
use crate::order;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use self::overrides::OverrideMap;
use quire_extract::models::Book;
use quire_library::error::ErrorKind as LibraryErrorKind;
use quire_library::{UploadStream, covers, import};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;
use tracing::instrument;

/// Catalog backend holding the full index in process memory.
///
/// Supports every capability except backups (there is no persistent store
/// to snapshot; the override document is the only state worth keeping and
/// it is already its own file).
pub struct MemoryCatalog {
    root: PathBuf,
    covers_dir: PathBuf,
    override_path: PathBuf,
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    index: Index,
    overrides: OverrideMap,
}

/// The queryable index: a vector kept in the default catalog order plus
/// lookup maps from id and facet values.
#[derive(Default)]
struct Index {
    books: Vec<Book>,
    by_id: HashMap<String, usize>,
    authors: HashMap<String, Vec<String>>,
    tags: HashMap<String, Vec<String>>,
}

impl Index {
    fn get(&self, id: &str) -> Option<&Book> {
        self.by_id.get(id).map(|&at| &self.books[at])
    }

    /// Inserts or replaces a book. Callers must [`publish`](Self::publish)
    /// before the next read.
    fn insert(&mut self, book: Book) {
        match self.books.iter().position(|b| b.id == book.id) {
            Some(at) => self.books[at] = book,
            None => self.books.push(book),
        }
    }

    /// Removes a book by id. Callers must [`publish`](Self::publish)
    /// before the next read.
    fn remove(&mut self, id: &str) -> Option<Book> {
        let at = self.books.iter().position(|b| b.id == id)?;
        Some(self.books.remove(at))
    }

    /// Restores the index invariants after a batch of mutations: sorts the
    /// vector into the default order and rebuilds the id and facet maps.
    /// Facet buckets are rebuilt from the book set, so a deleted or
    /// re-tagged book never lingers in a stale bucket.
    fn publish(&mut self) {
        self.books.sort_by(order::default_order);
        self.by_id = self.books.iter().enumerate().map(|(at, b)| (b.id.clone(), at)).collect();
        self.authors.clear();
        self.tags.clear();
        for book in &self.books {
            for author in &book.authors {
                self.authors.entry(author.name.clone()).or_default().push(book.id.clone());
            }
            for tag in &book.tags {
                self.tags.entry(tag.clone()).or_default().push(book.id.clone());
            }
        }
    }
}

impl MemoryCatalog {
    /// Opens (or initializes) the catalog rooted at `root`: ensures the
    /// cover cache directory, loads persisted overrides, and performs the
    /// initial scan.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let covers_dir = root.join(".covers");
        tokio::fs::create_dir_all(&covers_dir).await.or_raise(|| ErrorKind::Storage)?;
        let override_path = root.join(overrides::OVERRIDE_FILENAME);
        let overrides = OverrideMap::load(&override_path).await?;

        let catalog = Self {
            root,
            covers_dir,
            override_path,
            state: RwLock::new(State { index: Index::default(), overrides }),
        };
        catalog.reconcile().await?;
        Ok(catalog)
    }

    /// One reconcile pass. Newly discovered files are parsed off-lock and
    /// inserted with the latest overrides merged in; entries whose files
    /// vanished are dropped; everything else is left untouched, so an
    /// upload that completed while we were scanning survives the pass.
    #[instrument(skip(self))]
    async fn reconcile(&self) -> Result<()> {
        let known: HashMap<PathBuf, String> = {
            let state = self.state.read().await;
            state.index.books.iter().map(|b| (b.files[0].path.clone(), b.id.clone())).collect()
        };

        let on_disk = discover::scan_root(&self.root).await?;
        let disk_set: HashSet<&PathBuf> = on_disk.iter().collect();
        let new_paths: Vec<PathBuf> =
            on_disk.iter().filter(|p| !known.contains_key(*p)).cloned().collect();
        let fresh = discover::parse_new(new_paths, self.covers_dir.clone()).await?;

        let mut state = self.state.write().await;
        for (path, id) in &known {
            if !disk_set.contains(path) {
                state.index.remove(id);
            }
        }
        for mut book in fresh {
            state.overrides.apply_to(&mut book);
            state.index.insert(book);
        }
        state.index.publish();
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn all_books(&self, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)> {
        let state = self.state.read().await;
        Ok(order::paginate(&state.index.books, offset, limit))
    }

    async fn book_by_id(&self, id: &str) -> Result<Book> {
        let state = self.state.read().await;
        state.index.get(id).cloned().ok_or_raise(|| ErrorKind::NotFound(id.to_string()))
    }

    async fn search(&self, query: SearchQuery) -> Result<(Vec<Book>, usize)> {
        let state = self.state.read().await;
        let needle = query.text.to_lowercase();
        let mut matched: Vec<Book> = state
            .index
            .books
            .iter()
            .filter(|b| matches_text(b, &needle))
            .filter(|b| !query.unread_only || !b.is_read)
            .filter(|b| query.series.is_empty() || b.series == query.series)
            .cloned()
            .collect();
        matched.sort_by(order::search_order(&query));
        Ok(order::paginate(&matched, query.offset, query.limit))
    }

    async fn books_by_author(&self, author: &str, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)> {
        let state = self.state.read().await;
        let ids = state.index.authors.get(author).map(Vec::as_slice).unwrap_or_default();
        let mut books: Vec<Book> = ids.iter().filter_map(|id| state.index.get(id)).cloned().collect();
        books.sort_by(order::title_order);
        Ok(order::paginate(&books, offset, limit))
    }

    async fn books_by_tag(&self, tag: &str, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)> {
        let state = self.state.read().await;
        let ids = state.index.tags.get(tag).map(Vec::as_slice).unwrap_or_default();
        let mut books: Vec<Book> = ids.iter().filter_map(|id| state.index.get(id)).cloned().collect();
        books.sort_by(order::title_order);
        Ok(order::paginate(&books, offset, limit))
    }

    async fn authors(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.index.authors.keys().cloned().collect();
        names.sort_by_key(|name| name.to_lowercase());
        Ok(order::paginate(&names, offset, limit))
    }

    async fn tags(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)> {
        let state = self.state.read().await;
        let mut tags: Vec<String> = state.index.tags.keys().cloned().collect();
        tags.sort_by_key(|tag| tag.to_lowercase());
        Ok(order::paginate(&tags, offset, limit))
    }

    fn as_uploader(&self) -> Option<&dyn Uploader> {
        Some(self)
    }
    fn as_cover_provider(&self) -> Option<&dyn CoverProvider> {
        Some(self)
    }
    fn as_updater(&self) -> Option<&dyn Updater> {
        Some(self)
    }
    fn as_refresher(&self) -> Option<&dyn Refresher> {
        Some(self)
    }
    fn as_series_lister(&self) -> Option<&dyn SeriesLister> {
        Some(self)
    }
    fn as_deleter(&self) -> Option<&dyn Deleter> {
        Some(self)
    }
    fn as_cover_updater(&self) -> Option<&dyn CoverUpdater> {
        Some(self)
    }
}

fn matches_text(book: &Book, needle: &str) -> bool {
    needle.is_empty()
        || book.title.to_lowercase().contains(needle)
        || book.authors.iter().any(|a| a.name.to_lowercase().contains(needle))
}

#[async_trait]
impl Uploader for MemoryCatalog {
    async fn store_book(&self, filename: &str, src: UploadStream<'_>) -> Result<Book> {
        let dest = match import::receive(&self.root, filename, src).await {
            Ok(dest) => dest,
            Err(err) => match err.deref() {
                LibraryErrorKind::Unsupported(ext) => exn::bail!(ErrorKind::UnsupportedType(ext.clone())),
                LibraryErrorKind::Duplicate(name) => exn::bail!(ErrorKind::DuplicateUpload(name.clone())),
                LibraryErrorKind::Io => return Err(err).or_raise(|| ErrorKind::Storage),
            },
        };

        // A parse failure leaves the renamed file in place; the next
        // reconcile pass retries it.
        let mut book = discover::parse_stored(dest, self.covers_dir.clone()).await?;

        let mut state = self.state.write().await;
        state.overrides.apply_to(&mut book);
        state.index.insert(book.clone());
        state.index.publish();
        Ok(book)
    }
}

#[async_trait]
impl Updater for MemoryCatalog {
    async fn update_book(&self, id: &str, update: BookUpdate) -> Result<Book> {
        let mut state = self.state.write().await;
        let Some(&at) = state.index.by_id.get(id) else {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        };

        let record = {
            let record = state.overrides.record_mut(id);
            record.merge(&update);
            record.clone()
        };
        let book = &mut state.index.books[at];
        record.apply(book);
        book.updated_at = UtcDateTime::now();
        let merged = book.clone();
        state.index.publish();

        state.overrides.save(&self.override_path).await?;
        Ok(merged)
    }
}

#[async_trait]
impl Refresher for MemoryCatalog {
    async fn refresh(&self) -> Result<()> {
        self.reconcile().await
    }
}

#[async_trait]
impl Deleter for MemoryCatalog {
    async fn delete_book(&self, id: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.write().await;
            let Some(book) = state.index.remove(id) else {
                exn::bail!(ErrorKind::NotFound(id.to_string()));
            };
            state.index.publish();
            state.overrides.remove(id);
            state.overrides.save(&self.override_path).await?;
            book
        };

        // Best-effort cleanup; the index entry is already gone.
        for file in &removed.files {
            if let Err(err) = tokio::fs::remove_file(&file.path).await {
                tracing::warn!(path = %file.path.display(), error = %err, "could not remove book file");
            }
        }
        covers::remove(&self.covers_dir, id).await;
        Ok(())
    }
}

#[async_trait]
impl CoverProvider for MemoryCatalog {
    async fn cover_path(&self, id: &str) -> Result<PathBuf> {
        quire_extract::cover_path(&self.covers_dir, id)
            .or_raise(|| ErrorKind::NotFound(id.to_string()))
    }
}

#[async_trait]
impl CoverUpdater for MemoryCatalog {
    async fn update_cover(&self, id: &str, src: UploadStream<'_>, ext: &str) -> Result<()> {
        {
            let state = self.state.read().await;
            if state.index.get(id).is_none() {
                exn::bail!(ErrorKind::NotFound(id.to_string()));
            }
        }
        covers::replace(&self.covers_dir, id, ext, src).await.or_raise(|| ErrorKind::Storage)?;

        let cover_url = format!("/covers/{id}");
        let mut state = self.state.write().await;
        if let Some(&at) = state.index.by_id.get(id) {
            let book = &mut state.index.books[at];
            book.cover_url = cover_url.clone();
            book.thumbnail_url = cover_url;
        }
        Ok(())
    }
}

#[async_trait]
impl SeriesLister for MemoryCatalog {
    async fn series(&self) -> Result<Vec<SeriesEntry>> {
        let state = self.state.read().await;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for book in state.index.books.iter().filter(|b| !b.series.is_empty()) {
            *counts.entry(book.series.as_str()).or_default() += 1;
        }
        let mut entries: Vec<SeriesEntry> = counts
            .into_iter()
            .map(|(name, count)| SeriesEntry { name: name.to_string(), count })
            .collect();
        entries.sort_by_key(|entry| entry.name.to_lowercase());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Capability, capabilities};
    use crate::testutil::{epub_bytes, write_epub};

    async fn upload(catalog: &MemoryCatalog, filename: &str, title: &str, authors: &[&str], tags: &[&str]) -> Book {
        let bytes = epub_bytes(title, authors, tags);
        let mut src: &[u8] = &bytes;
        catalog.store_book(filename, &mut src).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        upload(&catalog, "learning-go.epub", "Learning Go", &["Jon Bodner"], &["Programming"]).await;

        let (books, total) = catalog.all_books(0, 50).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "Learning Go");
        assert_eq!(books[0].authors[0].name, "Jon Bodner");
        assert_eq!(books[0].tags, vec!["Programming"]);
        // The file landed in the library root under its basename.
        assert!(dir.path().join("learning-go.epub").exists());
    }

    #[tokio::test]
    async fn test_search_by_title_substring() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        upload(&catalog, "go.epub", "Learning Go", &[], &[]).await;
        upload(&catalog, "py.epub", "Learning Python", &[], &[]).await;

        let (books, total) = catalog
            .search(SearchQuery { text: "Go".to_string(), ..SearchQuery::default() })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "Learning Go");

        let (_, total) = catalog
            .search(SearchQuery { text: "Learning".to_string(), ..SearchQuery::default() })
            .await
            .unwrap();
        assert_eq!(total, 2);

        let (books, total) = catalog
            .search(SearchQuery { text: "xyz".to_string(), ..SearchQuery::default() })
            .await
            .unwrap();
        assert!(books.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_search_matches_author_names() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        upload(&catalog, "a.epub", "Some Title", &["Ursula K. Le Guin"], &[]).await;

        let (books, total) = catalog
            .search(SearchQuery { text: "le guin".to_string(), ..SearchQuery::default() })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "Some Title");
    }

    #[tokio::test]
    async fn test_pagination_spans_three_pages() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        for name in ["A", "B", "C", "D", "E"] {
            upload(&catalog, &format!("{name}.epub"), name, &[], &[]).await;
        }

        let (page, total) = catalog.all_books(0, 2).await.unwrap();
        assert_eq!((page.len(), total), (2, 5));
        let (page, total) = catalog.all_books(2, 2).await.unwrap();
        assert_eq!((page.len(), total), (2, 5));
        let (page, total) = catalog.all_books(4, 2).await.unwrap();
        assert_eq!((page.len(), total), (1, 5));
    }

    #[tokio::test]
    async fn test_override_wins_and_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let book = upload(&catalog, "original.epub", "Original", &["Author"], &[]).await;

        let updated = catalog
            .update_book(
                &book.id,
                BookUpdate {
                    title: Some("Renamed".to_string()),
                    tags: Some(vec!["fiction".to_string(), "adventure".to_string()]),
                    ..BookUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.tags, vec!["fiction", "adventure"]);
        assert!(updated.updated_at >= updated.added_at);

        // The source file still carries the original OPF title.
        let scratch = tempfile::tempdir().unwrap();
        let reparsed =
            quire_extract::parse_book(&dir.path().join("original.epub"), scratch.path()).unwrap();
        assert_eq!(reparsed.title, "Original");

        // Facets follow the edit.
        let (tagged, _) = catalog.books_by_tag("fiction", 0, 10).await.unwrap();
        assert_eq!(tagged.len(), 1);

        // A fresh process reloads the override document and re-applies it.
        drop(catalog);
        let reopened = MemoryCatalog::open(dir.path()).await.unwrap();
        let again = reopened.book_by_id(&book.id).await.unwrap();
        assert_eq!(again.title, "Renamed");
        assert_eq!(again.tags, vec!["fiction", "adventure"]);
    }

    #[tokio::test]
    async fn test_reconcile_drops_removed_files() {
        let dir = tempfile::tempdir().unwrap();
        write_epub(&dir.path().join("gone.epub"), "Gone Soon", &[], &[]);
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        assert_eq!(catalog.all_books(0, 50).await.unwrap().1, 1);

        std::fs::remove_file(dir.path().join("gone.epub")).unwrap();
        catalog.refresh().await.unwrap();

        let (books, total) = catalog.all_books(0, 50).await.unwrap();
        assert!(books.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent_and_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        write_epub(&dir.path().join("keep.epub"), "Keep Me", &["A"], &["t"]);
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let id = catalog.all_books(0, 1).await.unwrap().0[0].id.clone();
        catalog
            .update_book(&id, BookUpdate { title: Some("Kept".to_string()), ..BookUpdate::default() })
            .await
            .unwrap();

        catalog.refresh().await.unwrap();
        catalog.refresh().await.unwrap();

        let (books, total) = catalog.all_books(0, 50).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(books[0].title, "Kept");
    }

    #[tokio::test]
    async fn test_delete_purges_everything() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let book = upload(&catalog, "doomed.epub", "Doomed", &["Vanishing Author"], &["ephemera"]).await;

        catalog.delete_book(&book.id).await.unwrap();

        let err = catalog.book_by_id(&book.id).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_)));
        assert_eq!(catalog.authors(0, 10).await.unwrap().1, 0);
        assert_eq!(catalog.tags(0, 10).await.unwrap().1, 0);
        assert!(!dir.path().join("doomed.epub").exists());

        let err = catalog.delete_book(&book.id).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_and_unsupported_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        upload(&catalog, "book.epub", "Book", &[], &[]).await;

        let bytes = epub_bytes("Book", &[], &[]);
        let mut src: &[u8] = &bytes;
        let err = catalog.store_book("book.epub", &mut src).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::DuplicateUpload(_)));

        let mut src: &[u8] = b"#!/bin/sh";
        let err = catalog.store_book("script.sh", &mut src).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_facet_queries_sort_by_title() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        upload(&catalog, "z.epub", "zeta", &["Shared"], &["both"]).await;
        upload(&catalog, "a.epub", "Alpha", &["Shared"], &["both"]).await;

        let (books, total) = catalog.books_by_author("Shared", 0, 10).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(books[0].title, "Alpha");
        let (books, _) = catalog.books_by_tag("both", 0, 10).await.unwrap();
        assert_eq!(books[0].title, "Alpha");
    }

    #[tokio::test]
    async fn test_series_listing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let one = upload(&catalog, "one.epub", "One", &[], &[]).await;
        let two = upload(&catalog, "two.epub", "Two", &[], &[]).await;
        upload(&catalog, "solo.epub", "Solo", &[], &[]).await;
        for id in [&one.id, &two.id] {
            catalog
                .update_book(id, BookUpdate { series: Some("Saga".to_string()), ..BookUpdate::default() })
                .await
                .unwrap();
        }

        let entries = catalog.series().await.unwrap();
        assert_eq!(entries, vec![SeriesEntry { name: "Saga".to_string(), count: 2 }]);
    }

    #[tokio::test]
    async fn test_search_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let a = upload(&catalog, "a.epub", "Book A", &[], &[]).await;
        let b = upload(&catalog, "b.epub", "Book B", &[], &[]).await;
        upload(&catalog, "c.epub", "Book C", &[], &[]).await;
        catalog
            .update_book(
                &a.id,
                BookUpdate {
                    is_read: Some(true),
                    series: Some("S".to_string()),
                    series_index: Some("2".to_string()),
                    ..BookUpdate::default()
                },
            )
            .await
            .unwrap();
        catalog
            .update_book(
                &b.id,
                BookUpdate {
                    series: Some("S".to_string()),
                    series_index: Some("10".to_string()),
                    ..BookUpdate::default()
                },
            )
            .await
            .unwrap();

        let (books, total) = catalog
            .search(SearchQuery { unread_only: true, ..SearchQuery::default() })
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(books.iter().all(|b| !b.is_read));

        let (books, total) = catalog
            .search(SearchQuery {
                series: "S".to_string(),
                sort_by: crate::contract::SortBy::SeriesIndex,
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 2);
        // Numeric order: 2 before 10.
        assert_eq!(books[0].series_index, "2");
        assert_eq!(books[1].series_index, "10");

        let (books, _) = catalog
            .search(SearchQuery {
                sort_by: crate::contract::SortBy::Title,
                sort_order: Some(crate::contract::SortOrder::Asc),
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Book A", "Book B", "Book C"]);
    }

    #[tokio::test]
    async fn test_update_cover_and_serve() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let book = upload(&catalog, "b.epub", "B", &[], &[]).await;
        assert!(catalog.cover_path(&book.id).await.is_err());

        let mut src: &[u8] = b"png-data";
        catalog.update_cover(&book.id, &mut src, ".png").await.unwrap();

        let path = catalog.cover_path(&book.id).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"png-data");
        let served = catalog.book_by_id(&book.id).await.unwrap();
        assert_eq!(served.cover_url, format!("/covers/{}", book.id));
        assert_eq!(served.thumbnail_url, served.cover_url);

        let mut src: &[u8] = b"x";
        let err = catalog.update_cover("missing-id", &mut src, ".jpg").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_limit_means_no_limit() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        for name in ["A", "B", "C"] {
            upload(&catalog, &format!("{name}.epub"), name, &["Author"], &[]).await;
        }

        let (books, total) = catalog.all_books(0, 0).await.unwrap();
        assert_eq!((books.len(), total), (3, 3));
        let (by_author, _) = catalog.books_by_author("Author", 0, 0).await.unwrap();
        assert_eq!(by_author.len(), 3);
    }

    #[tokio::test]
    async fn test_facet_lists_are_sorted_and_paginated() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        upload(&catalog, "a.epub", "A", &["zola"], &["zines"]).await;
        upload(&catalog, "b.epub", "B", &["Abbott"], &["Art"]).await;
        upload(&catalog, "c.epub", "C", &["mead"], &["maps"]).await;

        let (names, total) = catalog.authors(0, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(names, vec!["Abbott".to_string(), "mead".to_string()]);
        let (names, _) = catalog.authors(2, 2).await.unwrap();
        assert_eq!(names, vec!["zola".to_string()]);

        let (tags, total) = catalog.tags(0, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(tags, vec!["Art".to_string(), "maps".to_string(), "zines".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_reads_during_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = std::sync::Arc::new(MemoryCatalog::open(dir.path()).await.unwrap());
        for n in 0..8 {
            write_epub(&dir.path().join(format!("book-{n}.epub")), &format!("Book {n}"), &[], &[]);
        }

        let refresher = catalog.clone();
        let refresh = tokio::spawn(async move { refresher.refresh().await });
        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader = catalog.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..16 {
                    let (_, total) = reader.all_books(0, 0).await.unwrap();
                    assert!(total <= 8);
                }
            }));
        }
        refresh.await.unwrap().unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(catalog.all_books(0, 0).await.unwrap().1, 8);
    }

    #[tokio::test]
    async fn test_capability_set() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).await.unwrap();
        let caps = capabilities(&catalog);
        assert!(caps.contains(&Capability::Read));
        assert!(caps.contains(&Capability::Upload));
        assert!(caps.contains(&Capability::UpdateMetadata));
        assert!(caps.contains(&Capability::Delete));
        assert!(caps.contains(&Capability::Refresh));
        assert!(caps.contains(&Capability::UpdateCover));
        assert!(caps.contains(&Capability::ListSeries));
        assert!(caps.contains(&Capability::ServeCover));
        assert!(!caps.contains(&Capability::Backup));
    }
}
