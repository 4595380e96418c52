//! SQLite catalog backend.
//!
//! All book metadata, including user edits, lives in `.catalog.db` under
//! the library root; edits are written straight onto the rows, so there is
//! no override side-file. WAL journaling gives concurrent readers with a
//! single serialized writer, which is why this backend needs no in-process
//! lock. Multi-statement writes run inside transactions that roll back on
//! any error.

mod backup;
mod migrate;
mod row;

use crate::contract::{
    BookUpdate, Backupper, Catalog, CoverProvider, CoverUpdater, Deleter, Refresher, SearchQuery,
    SeriesEntry, SeriesLister, SortBy, SortOrder, Updater, Uploader,
};
use crate::discover;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use quire_extract::models::Book;
use quire_library::error::ErrorKind as LibraryErrorKind;
use quire_library::{UploadStream, covers, import};
use self::row::BookRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcDateTime;
use tracing::instrument;

/// Database filename kept directly under the library root.
const DB_FILENAME: &str = ".catalog.db";
const MAX_CONNECTIONS: u32 = 5;

/// The single-SELECT read shape: every scalar column plus the author and
/// tag relations aggregated into JSON arrays, authors in `position` order.
const BOOK_SELECT: &str = "\
SELECT b.id, b.title, b.summary, b.language, b.publisher, b.published_at, b.updated_at, b.added_at,
       b.series, b.series_index, b.series_total, b.is_read, b.rating, b.cover_url, b.thumbnail_url,
       b.file_path, b.file_mime, b.file_size,
       (SELECT json_group_array(json_object('name', a.author_name, 'uri', a.author_uri))
          FROM (SELECT author_name, author_uri FROM book_authors
                 WHERE book_id = b.id ORDER BY position) a) AS authors_json,
       (SELECT json_group_array(bt.tag) FROM book_tags bt WHERE bt.book_id = b.id) AS tags_json
  FROM books b";

/// Catalog backend persisting everything in an embedded SQLite database.
/// Supports every capability, including backups.
pub struct SqliteCatalog {
    root: PathBuf,
    covers_dir: PathBuf,
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Opens (or creates) the catalog database at `{root}/.catalog.db`,
    /// applies pending schema migrations, and performs the initial scan.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let covers_dir = root.join(".covers");
        tokio::fs::create_dir_all(&covers_dir).await.or_raise(|| ErrorKind::Storage)?;

        let options = SqliteConnectOptions::new()
            .filename(root.join(DB_FILENAME))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(1500));
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        migrate::run(&pool).await?;

        let catalog = Self { root, covers_dir, pool };
        catalog.reconcile().await?;
        Ok(catalog)
    }

    /// Lets SQLite refresh query-planner statistics, then drains the pool.
    /// The catalog must not be used afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    /// One reconcile pass: insert newly discovered files, delete rows whose
    /// files no longer exist, leave everything else untouched (metadata is
    /// not re-parsed for known files).
    #[instrument(skip(self))]
    async fn reconcile(&self) -> Result<()> {
        let on_disk = discover::scan_root(&self.root).await?;
        let disk_set: HashSet<&PathBuf> = on_disk.iter().collect();

        let indexed: Vec<(String, String)> = sqlx::query_as("SELECT id, file_path FROM books")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        let known: HashMap<PathBuf, String> =
            indexed.into_iter().map(|(id, path)| (PathBuf::from(path), id)).collect();

        let new_paths: Vec<PathBuf> =
            on_disk.iter().filter(|p| !known.contains_key(*p)).cloned().collect();
        for book in discover::parse_new(new_paths, self.covers_dir.clone()).await? {
            if let Err(err) = self.insert_book(&book).await {
                tracing::warn!(id = %book.id, error = %err, "could not index discovered book");
            }
        }

        for (path, id) in &known {
            if !disk_set.contains(path) {
                sqlx::query("DELETE FROM books WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .or_raise(|| ErrorKind::Storage)?;
            }
        }
        Ok(())
    }

    /// Adds a book and its relations in one transaction. A no-op if the id
    /// is already present.
    async fn insert_book(&self, book: &Book) -> Result<()> {
        let file = book.files.first();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Storage)?;
        sqlx::query(
            "INSERT OR IGNORE INTO books
                 (id, title, summary, language, publisher, published_at, updated_at, added_at,
                  series, series_index, series_total, is_read, rating, cover_url, thumbnail_url,
                  file_path, file_mime, file_size)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.summary)
        .bind(&book.language)
        .bind(&book.publisher)
        .bind(row::published_timestamp(book.published))
        .bind(row::timestamp(book.updated_at))
        .bind(row::timestamp(book.added_at))
        .bind(&book.series)
        .bind(&book.series_index)
        .bind(&book.series_total)
        .bind(book.is_read as i64)
        .bind(book.rating as i64)
        .bind(&book.cover_url)
        .bind(&book.thumbnail_url)
        .bind(file.map(|f| f.path.to_string_lossy().into_owned()).unwrap_or_default())
        .bind(file.map(|f| f.mime_type.clone()).unwrap_or_default())
        .bind(file.map(|f| f.size as i64).unwrap_or_default())
        .execute(&mut *tx)
        .await
        .or_raise(|| ErrorKind::Storage)?;

        for (position, author) in book.authors.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO book_authors (book_id, author_name, author_uri, position)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&book.id)
            .bind(&author.name)
            .bind(&author.uri)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        }
        for tag in &book.tags {
            sqlx::query("INSERT OR IGNORE INTO book_tags (book_id, tag) VALUES (?, ?)")
                .bind(&book.id)
                .bind(tag)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Storage)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Storage)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Book> {
        let sql = format!("{BOOK_SELECT} WHERE b.id = ? LIMIT 1");
        let row: Option<BookRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        match row {
            Some(row) => Book::try_from(row),
            None => exn::bail!(ErrorKind::NotFound(id.to_string())),
        }
    }
}

fn decode_books(rows: Vec<BookRow>) -> Result<Vec<Book>> {
    rows.into_iter().map(Book::try_from).collect()
}

/// SQLite treats a negative LIMIT as "no limit"; the contract spells that
/// as zero.
fn sql_limit(limit: usize) -> i64 {
    if limit == 0 { -1 } else { limit as i64 }
}

/// The SQL twin of [`order::search_order`](crate::order). The memory
/// backend's comparators define what these clauses must produce.
fn order_clause(query: &SearchQuery) -> &'static str {
    match (query.sort_by, query.sort_order) {
        (SortBy::SeriesIndex, _) => "CAST(b.series_index AS REAL), b.series_index, LOWER(b.title)",
        (SortBy::Title, Some(SortOrder::Desc)) => "LOWER(b.title) DESC",
        (SortBy::Title, _) => "LOWER(b.title) ASC",
        (SortBy::Added, Some(SortOrder::Asc)) => "b.added_at ASC, LOWER(b.title)",
        (SortBy::Added, _) => "b.added_at DESC, LOWER(b.title)",
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn all_books(&self, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        let sql = format!("{BOOK_SELECT} ORDER BY b.added_at DESC, LOWER(b.title) LIMIT ? OFFSET ?");
        let rows: Vec<BookRow> = sqlx::query_as(&sql)
            .bind(sql_limit(limit))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        Ok((decode_books(rows)?, total as usize))
    }

    async fn book_by_id(&self, id: &str) -> Result<Book> {
        self.fetch_by_id(id).await
    }

    async fn search(&self, query: SearchQuery) -> Result<(Vec<Book>, usize)> {
        let mut filters = String::new();
        if query.unread_only {
            filters.push_str(" AND b.is_read = 0");
        }
        if !query.series.is_empty() {
            filters.push_str(" AND b.series = ?");
        }
        let order_by = order_clause(&query);

        if query.text.is_empty() {
            let count_sql = format!("SELECT COUNT(*) FROM books b WHERE 1=1{filters}");
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            if !query.series.is_empty() {
                count = count.bind(&query.series);
            }
            let total = count.fetch_one(&self.pool).await.or_raise(|| ErrorKind::Storage)?;

            let sql = format!("{BOOK_SELECT} WHERE 1=1{filters} ORDER BY {order_by} LIMIT ? OFFSET ?");
            let mut rows = sqlx::query_as::<_, BookRow>(&sql);
            if !query.series.is_empty() {
                rows = rows.bind(&query.series);
            }
            let rows = rows
                .bind(sql_limit(query.limit))
                .bind(query.offset as i64)
                .fetch_all(&self.pool)
                .await
                .or_raise(|| ErrorKind::Storage)?;
            return Ok((decode_books(rows)?, total as usize));
        }

        let like = format!("%{}%", query.text.to_lowercase());
        let count_sql = format!(
            "SELECT COUNT(DISTINCT b.id) FROM books b
             LEFT JOIN book_authors ba ON ba.book_id = b.id
             WHERE (LOWER(b.title) LIKE ? OR LOWER(ba.author_name) LIKE ?){filters}"
        );
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(&like).bind(&like);
        if !query.series.is_empty() {
            count = count.bind(&query.series);
        }
        let total = count.fetch_one(&self.pool).await.or_raise(|| ErrorKind::Storage)?;

        let sql = format!(
            "{BOOK_SELECT}
             JOIN (SELECT DISTINCT b2.id FROM books b2
                     LEFT JOIN book_authors ba2 ON ba2.book_id = b2.id
                    WHERE (LOWER(b2.title) LIKE ? OR LOWER(ba2.author_name) LIKE ?)) matched
               ON b.id = matched.id
             WHERE 1=1{filters} ORDER BY {order_by} LIMIT ? OFFSET ?"
        );
        let mut rows = sqlx::query_as::<_, BookRow>(&sql).bind(&like).bind(&like);
        if !query.series.is_empty() {
            rows = rows.bind(&query.series);
        }
        let rows = rows
            .bind(sql_limit(query.limit))
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        Ok((decode_books(rows)?, total as usize))
    }

    async fn books_by_author(&self, author: &str, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM books b JOIN book_authors ba ON ba.book_id = b.id WHERE ba.author_name = ?",
        )
        .bind(author)
        .fetch_one(&self.pool)
        .await
        .or_raise(|| ErrorKind::Storage)?;

        let sql = format!(
            "{BOOK_SELECT} JOIN book_authors ba ON ba.book_id = b.id
             WHERE ba.author_name = ? ORDER BY LOWER(b.title) LIMIT ? OFFSET ?"
        );
        let rows: Vec<BookRow> = sqlx::query_as(&sql)
            .bind(author)
            .bind(sql_limit(limit))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        Ok((decode_books(rows)?, total as usize))
    }

    async fn books_by_tag(&self, tag: &str, offset: usize, limit: usize) -> Result<(Vec<Book>, usize)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM books b JOIN book_tags bt ON bt.book_id = b.id WHERE bt.tag = ?",
        )
        .bind(tag)
        .fetch_one(&self.pool)
        .await
        .or_raise(|| ErrorKind::Storage)?;

        let sql = format!(
            "{BOOK_SELECT} JOIN book_tags bt ON bt.book_id = b.id
             WHERE bt.tag = ? ORDER BY LOWER(b.title) LIMIT ? OFFSET ?"
        );
        let rows: Vec<BookRow> = sqlx::query_as(&sql)
            .bind(tag)
            .bind(sql_limit(limit))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        Ok((decode_books(rows)?, total as usize))
    }

    async fn authors(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT author_name) FROM book_authors")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT author_name FROM book_authors ORDER BY LOWER(author_name) LIMIT ? OFFSET ?",
        )
        .bind(sql_limit(limit))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Storage)?;
        Ok((names, total as usize))
    }

    async fn tags(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT tag) FROM book_tags")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT tag FROM book_tags ORDER BY LOWER(tag) LIMIT ? OFFSET ?",
        )
        .bind(sql_limit(limit))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Storage)?;
        Ok((tags, total as usize))
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
    fn as_backupper(&self) -> Option<&dyn Backupper> {
        Some(self)
    }
}

#[async_trait]
impl Uploader for SqliteCatalog {
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
        let book = discover::parse_stored(dest, self.covers_dir.clone()).await?;
        self.insert_book(&book).await?;
        self.fetch_by_id(&book.id).await
    }
}

#[async_trait]
impl Updater for SqliteCatalog {
    async fn update_book(&self, id: &str, update: BookUpdate) -> Result<Book> {
        let mut book = self.fetch_by_id(id).await?;
        update.apply(&mut book);
        book.updated_at = UtcDateTime::now();

        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Storage)?;
        sqlx::query(
            "UPDATE books SET title = ?, summary = ?, language = ?, publisher = ?, updated_at = ?,
                              series = ?, series_index = ?, series_total = ?, is_read = ?, rating = ?
             WHERE id = ?",
        )
        .bind(&book.title)
        .bind(&book.summary)
        .bind(&book.language)
        .bind(&book.publisher)
        .bind(row::timestamp(book.updated_at))
        .bind(&book.series)
        .bind(&book.series_index)
        .bind(&book.series_total)
        .bind(book.is_read as i64)
        .bind(book.rating as i64)
        .bind(id)
        .execute(&mut *tx)
        .await
        .or_raise(|| ErrorKind::Storage)?;

        sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        for (position, author) in book.authors.iter().enumerate() {
            sqlx::query(
                "INSERT INTO book_authors (book_id, author_name, author_uri, position) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&author.name)
            .bind(&author.uri)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        }

        sqlx::query("DELETE FROM book_tags WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        for tag in &book.tags {
            sqlx::query("INSERT INTO book_tags (book_id, tag) VALUES (?, ?)")
                .bind(id)
                .bind(tag)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Storage)?;
        }

        tx.commit().await.or_raise(|| ErrorKind::Storage)?;
        self.fetch_by_id(id).await
    }
}

#[async_trait]
impl Refresher for SqliteCatalog {
    async fn refresh(&self) -> Result<()> {
        self.reconcile().await
    }
}

#[async_trait]
impl SeriesLister for SqliteCatalog {
    async fn series(&self) -> Result<Vec<SeriesEntry>> {
        let entries: Vec<(String, i64)> = sqlx::query_as(
            "SELECT series, COUNT(*) FROM books WHERE series != '' GROUP BY series ORDER BY LOWER(series)",
        )
        .fetch_all(&self.pool)
        .await
        .or_raise(|| ErrorKind::Storage)?;
        Ok(entries
            .into_iter()
            .map(|(name, count)| SeriesEntry { name, count: count.max(0) as usize })
            .collect())
    }
}

#[async_trait]
impl Deleter for SqliteCatalog {
    async fn delete_book(&self, id: &str) -> Result<()> {
        let file_path: Option<String> = sqlx::query_scalar("SELECT file_path FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        let Some(file_path) = file_path else {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        };

        // CASCADE clears book_authors and book_tags.
        sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;

        if let Err(err) = tokio::fs::remove_file(&file_path).await {
            tracing::warn!(path = %file_path, error = %err, "could not remove book file");
        }
        covers::remove(&self.covers_dir, id).await;
        Ok(())
    }
}

#[async_trait]
impl CoverProvider for SqliteCatalog {
    async fn cover_path(&self, id: &str) -> Result<PathBuf> {
        quire_extract::cover_path(&self.covers_dir, id)
            .or_raise(|| ErrorKind::NotFound(id.to_string()))
    }
}

#[async_trait]
impl CoverUpdater for SqliteCatalog {
    async fn update_cover(&self, id: &str, src: UploadStream<'_>, ext: &str) -> Result<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        if exists.is_none() {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        }

        covers::replace(&self.covers_dir, id, ext, src).await.or_raise(|| ErrorKind::Storage)?;

        let cover_url = format!("/covers/{id}");
        sqlx::query("UPDATE books SET cover_url = ?, thumbnail_url = ? WHERE id = ?")
            .bind(&cover_url)
            .bind(&cover_url)
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        Ok(())
    }
}

#[async_trait]
impl Backupper for SqliteCatalog {
    async fn backup(&self, dest_dir: &Path, keep: usize) -> Result<PathBuf> {
        backup::backup(&self.pool, dest_dir, keep).await
    }
}
