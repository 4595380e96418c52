//! User metadata overrides for the in-memory backend.
//!
//! Overrides layer user edits on top of parsed metadata without ever
//! mutating the source files, and survive rescans because they live in
//! their own JSON document (`.metadata.json` under the library root).
//!
//! Every field is tri-state: a key absent from the JSON object passes the
//! parsed value through; a present key is an active override, where an
//! explicit `null` clears the field to its empty value. Present-but-empty
//! ("" or []) is therefore distinct from absent, which is exactly what a
//! user clearing a summary expects.

use crate::contract::BookUpdate;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use quire_extract::models::{Author, Book};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Hidden override document kept directly under the library root.
pub(crate) const OVERRIDE_FILENAME: &str = ".metadata.json";

/// A single book's overrides, keyed by book id in the parent document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OverrideRecord {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) authors: Option<Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) tags: Option<Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) summary: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) publisher: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) language: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) series: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) series_index: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) series_total: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) is_read: Option<Option<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub(crate) rating: Option<Option<u8>>,
}

/// Deserializes a present key (possibly `null`) into `Some(_)`; absent
/// keys stay `None` through `#[serde(default)]`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl OverrideRecord {
    /// Merges an active override on top of a parsed book. Scalars replace;
    /// author and tag lists replace entirely (author `uri`s are discarded
    /// by edits).
    pub(crate) fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone().unwrap_or_default();
        }
        if let Some(authors) = &self.authors {
            book.authors = authors
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|name| Author { name, uri: String::new() })
                .collect();
        }
        if let Some(tags) = &self.tags {
            book.tags = tags.clone().unwrap_or_default();
        }
        if let Some(summary) = &self.summary {
            book.summary = summary.clone().unwrap_or_default();
        }
        if let Some(publisher) = &self.publisher {
            book.publisher = publisher.clone().unwrap_or_default();
        }
        if let Some(language) = &self.language {
            book.language = language.clone().unwrap_or_default();
        }
        if let Some(series) = &self.series {
            book.series = series.clone().unwrap_or_default();
        }
        if let Some(series_index) = &self.series_index {
            book.series_index = series_index.clone().unwrap_or_default();
        }
        if let Some(series_total) = &self.series_total {
            book.series_total = series_total.clone().unwrap_or_default();
        }
        if let Some(is_read) = self.is_read {
            book.is_read = is_read.unwrap_or_default();
        }
        if let Some(rating) = self.rating {
            book.rating = rating.unwrap_or_default();
        }
    }

    /// Folds an incoming edit into this record; untouched fields keep
    /// whatever override (or absence) they already had.
    pub(crate) fn merge(&mut self, update: &BookUpdate) {
        if let Some(title) = &update.title {
            self.title = Some(Some(title.clone()));
        }
        if let Some(authors) = &update.authors {
            self.authors = Some(Some(authors.clone()));
        }
        if let Some(tags) = &update.tags {
            self.tags = Some(Some(tags.clone()));
        }
        if let Some(summary) = &update.summary {
            self.summary = Some(Some(summary.clone()));
        }
        if let Some(publisher) = &update.publisher {
            self.publisher = Some(Some(publisher.clone()));
        }
        if let Some(language) = &update.language {
            self.language = Some(Some(language.clone()));
        }
        if let Some(series) = &update.series {
            self.series = Some(Some(series.clone()));
        }
        if let Some(series_index) = &update.series_index {
            self.series_index = Some(Some(series_index.clone()));
        }
        if let Some(series_total) = &update.series_total {
            self.series_total = Some(Some(series_total.clone()));
        }
        if let Some(is_read) = update.is_read {
            self.is_read = Some(Some(is_read));
        }
        if let Some(rating) = update.rating {
            self.rating = Some(Some(rating));
        }
    }
}

/// The full override document: book id → override record.
#[derive(Debug, Default)]
pub(crate) struct OverrideMap {
    records: HashMap<String, OverrideRecord>,
}

impl OverrideMap {
    /// Loads the override document. A missing file is an empty map, not an
    /// error.
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err).or_raise(|| ErrorKind::Storage),
        };
        let records = serde_json::from_slice(&data).or_raise(|| ErrorKind::Storage)?;
        Ok(Self { records })
    }

    /// Rewrites the whole document atomically: temp file in the same
    /// directory, fsync, rename. A reader at process start observes either
    /// the previous or the next complete version, never a mix.
    pub(crate) async fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.records).or_raise(|| ErrorKind::Storage)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let mut tmp = tempfile::Builder::new()
                .prefix(".metadata-")
                .suffix(".tmp")
                .tempfile_in(dir)
                .or_raise(|| ErrorKind::Storage)?;
            tmp.write_all(&data).or_raise(|| ErrorKind::Storage)?;
            tmp.as_file().sync_all().or_raise(|| ErrorKind::Storage)?;
            tmp.persist(&path).or_raise(|| ErrorKind::Storage)?;
            Ok(())
        })
        .await
        .or_raise(|| ErrorKind::Storage)?
    }

    /// The override record for a book, created empty on first edit.
    pub(crate) fn record_mut(&mut self, id: &str) -> &mut OverrideRecord {
        self.records.entry(id.to_string()).or_default()
    }

    /// Merges any stored override for the book's id onto it.
    pub(crate) fn apply_to(&self, book: &mut Book) {
        if let Some(record) = self.records.get(&book.id) {
            record.apply(book);
        }
    }

    pub(crate) fn remove(&mut self, id: &str) {
        self.records.remove(id);
    }
}
