//! EPUB container parsing.
//!
//! An EPUB is an outer ZIP whose `META-INF/container.xml` names an OPF
//! package document; the package carries the Dublin Core metadata, the
//! manifest, and the spine. Fatal failures (unreadable archive, missing
//! container, unusable package) abort the parse; cover extraction is
//! best-effort and never fails the call.

mod cover;
mod package;

use crate::error::{ErrorKind, Result};
use crate::id::path_to_id;
use crate::models::{Author, Book, BookFile, EPUB_MIME, OCTET_STREAM_MIME, PDF_MIME};
use exn::{OptionExt, ResultExt};
use self::package::Package;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcDateTime};
use tracing::instrument;
use zip::ZipArchive;

/// Parses an EPUB file into a [`Book`], caching the extracted cover image
/// (if any) under `covers_dir`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn parse_book(path: &Path, covers_dir: &Path) -> Result<Book> {
    let file = File::open(path).or_raise(|| ErrorKind::Archive(path.to_path_buf()))?;
    let mut archive = ZipArchive::new(file).or_raise(|| ErrorKind::Archive(path.to_path_buf()))?;

    let opf_path = container_rootfile(&mut archive)?;
    let opf_xml = read_entry(&mut archive, &opf_path)
        .ok_or_raise(|| ErrorKind::Package("package document missing from archive"))?;
    let package = Package::parse(&opf_xml)?;

    let (size, added_at) = stat(path);
    let id = path_to_id(path);
    let (series, series_index) = package.series().unwrap_or_default();

    let mut book = Book {
        id: id.clone(),
        title: package.title().map(str::to_owned).unwrap_or_else(|| filename_stem(path)),
        authors: package
            .creators
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| Author { name: name.clone(), uri: String::new() })
            .collect(),
        summary: package.description.clone(),
        language: package.language.clone(),
        publisher: package.publisher.clone(),
        published: parse_publication_date(&package.date),
        updated_at: UtcDateTime::now(),
        added_at,
        tags: package.subjects.clone(),
        series,
        series_index,
        series_total: String::new(),
        is_read: false,
        rating: 0,
        cover_url: String::new(),
        thumbnail_url: String::new(),
        files: vec![BookFile {
            mime_type: EPUB_MIME.to_string(),
            path: path.to_path_buf(),
            size,
        }],
    };

    if cover::extract_cover(&mut archive, &opf_path, &package, &id, covers_dir).is_some() {
        book.cover_url = format!("/covers/{id}");
        book.thumbnail_url = book.cover_url.clone();
    }

    Ok(book)
}

/// Creates a minimal [`Book`] for a non-EPUB file (e.g. PDF). Infallible:
/// everything is derived from the path and a best-effort stat.
pub fn parse_path(path: &Path) -> Book {
    let (size, added_at) = stat(path);
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_lowercase)
        .unwrap_or_default();
    let mime = if extension == "pdf" { PDF_MIME } else { OCTET_STREAM_MIME };

    Book {
        id: path_to_id(path),
        title: filename_stem(path),
        authors: Vec::new(),
        summary: String::new(),
        language: String::new(),
        publisher: String::new(),
        published: None,
        updated_at: UtcDateTime::now(),
        added_at,
        tags: Vec::new(),
        series: String::new(),
        series_index: String::new(),
        series_total: String::new(),
        is_read: false,
        rating: 0,
        cover_url: String::new(),
        thumbnail_url: String::new(),
        files: vec![BookFile {
            mime_type: mime.to_string(),
            path: path.to_path_buf(),
            size,
        }],
    }
}

/// Returns the cached cover image path for a book id, trying the known
/// image extensions in order.
pub fn cover_path(covers_dir: &Path, id: &str) -> Result<PathBuf> {
    for ext in crate::COVER_EXTENSIONS {
        let candidate = covers_dir.join(format!("{id}{ext}"));
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    exn::bail!(ErrorKind::CoverNotFound(id.to_string()))
}

/// Reads `META-INF/container.xml` and returns the OPF package path.
fn container_rootfile<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let xml = read_entry(archive, "META-INF/container.xml").ok_or_raise(|| ErrorKind::Container)?;
    let doc = roxmltree::Document::parse(&xml).or_raise(|| ErrorKind::Container)?;
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "rootfile")
        .and_then(|n| n.attribute("full-path"))
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .ok_or_raise(|| ErrorKind::Container)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut text = String::new();
    entry.read_to_string(&mut text).ok()?;
    Some(text)
}

/// Parses the first 10 characters of a `dc:date` value as `YYYY-MM-DD`.
/// Anything else (including a bare year) leaves the date unknown.
fn parse_publication_date(raw: &str) -> Option<Date> {
    if raw.is_empty() {
        return None;
    }
    let head = raw.get(..10).unwrap_or(raw);
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(head, &format).ok()
}

fn stat(path: &Path) -> (u64, UtcDateTime) {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let added = meta
                .modified()
                .map(|modified| UtcDateTime::from(OffsetDateTime::from(modified)))
                .unwrap_or_else(|_| UtcDateTime::now());
            (meta.len(), added)
        }
        Err(_) => (0, UtcDateTime::now()),
    }
}

fn filename_stem(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}
