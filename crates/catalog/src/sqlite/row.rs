//! Row ⇄ model conversions for the `books` table.
//!
//! Author and tag relations arrive pre-aggregated as JSON array columns
//! (see the single-SELECT in the backend module); decoding failures are
//! integrity violations, surfaced rather than papered over.

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use quire_extract::models::{Author, Book, BookFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::{Date, UtcDateTime};

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) summary: String,
    pub(crate) language: String,
    pub(crate) publisher: String,
    pub(crate) published_at: Option<i64>,
    pub(crate) updated_at: i64,
    pub(crate) added_at: i64,
    pub(crate) series: String,
    pub(crate) series_index: String,
    pub(crate) series_total: String,
    pub(crate) is_read: i64,
    pub(crate) rating: i64,
    pub(crate) cover_url: String,
    pub(crate) thumbnail_url: String,
    pub(crate) file_path: String,
    pub(crate) file_mime: String,
    pub(crate) file_size: i64,
    pub(crate) authors_json: Option<String>,
    pub(crate) tags_json: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct AuthorProxy {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uri: String,
}

impl TryFrom<BookRow> for Book {
    type Error = Error;

    fn try_from(row: BookRow) -> Result<Self> {
        let authors = match row.authors_json.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str::<Vec<AuthorProxy>>(json)
                .or_raise(|| ErrorKind::Integrity(row.id.clone()))?
                .into_iter()
                .map(|a| Author { name: a.name, uri: a.uri })
                .collect(),
            _ => Vec::new(),
        };
        let tags = match row.tags_json.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str::<Vec<String>>(json)
                .or_raise(|| ErrorKind::Integrity(row.id.clone()))?,
            _ => Vec::new(),
        };

        Ok(Book {
            published: row
                .published_at
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::Integrity(row.id.clone()))?
                .map(|at| at.date()),
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::Integrity(row.id.clone()))?,
            added_at: UtcDateTime::from_unix_timestamp(row.added_at)
                .or_raise(|| ErrorKind::Integrity(row.id.clone()))?,
            is_read: row.is_read != 0,
            rating: row.rating.clamp(0, 5) as u8,
            files: vec![BookFile {
                mime_type: row.file_mime,
                path: PathBuf::from(row.file_path),
                size: row.file_size.max(0) as u64,
            }],
            id: row.id,
            title: row.title,
            authors,
            summary: row.summary,
            language: row.language,
            publisher: row.publisher,
            tags,
            series: row.series,
            series_index: row.series_index,
            series_total: row.series_total,
            cover_url: row.cover_url,
            thumbnail_url: row.thumbnail_url,
        })
    }
}

/// Unix seconds for an instant column.
pub(crate) fn timestamp(at: UtcDateTime) -> i64 {
    at.unix_timestamp()
}

/// Unix seconds (at UTC midnight) for the optional publication date.
pub(crate) fn published_timestamp(date: Option<Date>) -> Option<i64> {
    date.map(|d| d.midnight().as_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;
    use time::Month;

    fn row() -> BookRow {
        BookRow {
            id: "abcdef0123456789".to_string(),
            title: "Learning Go".to_string(),
            summary: "Idiomatic Go.".to_string(),
            language: "en".to_string(),
            publisher: "O'Reilly".to_string(),
            published_at: Some(1_614_643_200),
            updated_at: 1_700_000_000,
            added_at: 1_600_000_000,
            series: String::new(),
            series_index: String::new(),
            series_total: String::new(),
            is_read: 1,
            rating: 4,
            cover_url: "/covers/abcdef0123456789".to_string(),
            thumbnail_url: "/covers/abcdef0123456789".to_string(),
            file_path: "/library/learning-go.epub".to_string(),
            file_mime: "application/epub+zip".to_string(),
            file_size: 2048,
            authors_json: Some(r#"[{"name":"Jon Bodner","uri":""}]"#.to_string()),
            tags_json: Some(r#"["Programming"]"#.to_string()),
        }
    }

    #[test]
    fn test_row_to_book() {
        let book = Book::try_from(row()).unwrap();
        assert_eq!(book.authors.len(), 1);
        assert_eq!(book.authors[0].name, "Jon Bodner");
        assert_eq!(book.tags, vec!["Programming"]);
        assert!(book.is_read);
        assert_eq!(book.rating, 4);
        assert_eq!(book.published, Some(Date::from_calendar_date(2021, Month::March, 2).unwrap()));
        assert_eq!(book.files[0].path, PathBuf::from("/library/learning-go.epub"));
    }

    #[test]
    fn test_empty_aggregates_decode_to_empty_lists() {
        let mut row = row();
        row.authors_json = Some("[]".to_string());
        row.tags_json = None;
        let book = Book::try_from(row).unwrap();
        assert!(book.authors.is_empty());
        assert!(book.tags.is_empty());
    }

    #[test]
    fn test_garbage_aggregate_is_an_integrity_error() {
        let mut row = row();
        row.authors_json = Some("not json".to_string());
        let err = Book::try_from(row).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Integrity(_)));
    }

    #[test]
    fn test_published_round_trip() {
        let date = Date::from_calendar_date(1996, Month::January, 1).unwrap();
        let ts = published_timestamp(Some(date)).unwrap();
        assert_eq!(UtcDateTime::from_unix_timestamp(ts).unwrap().date(), date);
        assert_eq!(published_timestamp(None), None);
    }
}
