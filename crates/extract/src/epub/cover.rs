//! Best-effort cover image extraction.
//!
//! Nothing in here fails the surrounding parse: every helper returns
//! `Option` and the caller simply ends up without a cover URL.

use super::package::Package;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Spine-scan read bound: only the first 64 KiB of an HTML document is
/// searched for an inline cover image. Covers live at the front of the
/// document; the bound keeps the fallback cheap on pathological files.
const SPINE_HTML_SCAN_LIMIT: u64 = 64 * 1024;

/// Finds and caches the cover image for a book, returning the cached path.
///
/// Resolution order: a manifest item carrying the `cover-image` property,
/// then the EPUB 2 `<meta name="cover">` item reference, then the first
/// `<img src>` of the first HTML spine document.
pub(crate) fn extract_cover<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    opf_path: &str,
    package: &Package,
    book_id: &str,
    covers_dir: &Path,
) -> Option<PathBuf> {
    let opf_dir = zip_parent(opf_path);
    if let Some(item) = package.cover_item() {
        let entry = join_zip_path(opf_dir, &item.href);
        let ext = media_type_extension(&item.media_type)
            .map(str::to_owned)
            .or_else(|| zip_extension(&item.href))
            .unwrap_or_else(|| ".jpg".to_string());
        return save_entry(archive, &entry, covers_dir, book_id, &ext);
    }
    cover_from_spine(archive, opf_dir, package, book_id, covers_dir)
}

/// Walks the spine in reading order and saves the first image referenced by
/// an HTML document as the cover.
fn cover_from_spine<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    opf_dir: &str,
    package: &Package,
    book_id: &str,
    covers_dir: &Path,
) -> Option<PathBuf> {
    for idref in &package.spine {
        let Some(item) = package.item_by_id(idref) else {
            continue;
        };
        if !item.media_type.contains("html") {
            continue;
        }
        let html_path = join_zip_path(opf_dir, &item.href);
        let head = {
            let Ok(entry) = archive.by_name(&html_path) else {
                continue;
            };
            let mut head = Vec::new();
            if entry.take(SPINE_HTML_SCAN_LIMIT).read_to_end(&mut head).is_err() {
                continue;
            }
            String::from_utf8_lossy(&head).into_owned()
        };
        let Some(src) = first_img_src(&head) else {
            continue;
        };

        // `/`-prefixed sources are ZIP-root-relative; everything else
        // resolves against the HTML document's own directory.
        let image_path = match src.strip_prefix('/') {
            Some(rooted) => normalize_zip_path(rooted),
            None => normalize_zip_path(&join_zip_path(zip_parent(&html_path), &src)),
        };
        let ext = zip_extension(&src).unwrap_or_else(|| ".jpg".to_string());
        if let Some(saved) = save_entry(archive, &image_path, covers_dir, book_id, &ext) {
            return Some(saved);
        }
    }
    None
}

/// Copies a ZIP entry into `covers_dir/{id}{ext}`. Skips the copy when a
/// file with that exact destination name already exists; removes a partial
/// destination when the copy fails midway.
fn save_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry_name: &str,
    covers_dir: &Path,
    book_id: &str,
    ext: &str,
) -> Option<PathBuf> {
    let mut entry = archive.by_name(entry_name).ok()?;
    let dest = covers_dir.join(format!("{book_id}{ext}"));
    if dest.exists() {
        return Some(dest);
    }
    let mut out = std::fs::File::create(&dest).ok()?;
    if std::io::copy(&mut entry, &mut out).is_err() {
        drop(out);
        let _ = std::fs::remove_file(&dest);
        return None;
    }
    Some(dest)
}

/// Scans an HTML fragment for the first `<img … src=…>` value. Handles
/// double-quoted, single-quoted and unquoted attributes, strips any query
/// string or fragment, and matches the tag and attribute case-insensitively.
pub(crate) fn first_img_src(html: &str) -> Option<String> {
    let start = find_ascii_ci(html, "<img", 0)?;
    let tag = &html[start..];
    let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
    let src_at = find_ascii_ci(tag, "src=", 0)?;
    let rest = &tag[src_at + 4..];

    let first = *rest.as_bytes().first()?;
    let value = match first {
        b'"' | b'\'' => {
            let body = &rest[1..];
            &body[..body.find(first as char).unwrap_or(body.len())]
        }
        _ => &rest[..rest.find([' ', '\t', '\n', '\r', '>']).unwrap_or(rest.len())],
    };
    let value = &value[..value.find('?').unwrap_or(value.len())];
    let value = &value[..value.find('#').unwrap_or(value.len())];
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Byte-wise ASCII case-insensitive substring search. Safe to index with:
/// a match can only begin on an ASCII byte, which is a char boundary.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&at| haystack[at..at + needle.len()].eq_ignore_ascii_case(needle))
}

/// Directory part of a ZIP entry name ("" for root-level entries).
pub(crate) fn zip_parent(name: &str) -> &str {
    name.rfind('/').map(|at| &name[..at]).unwrap_or("")
}

fn join_zip_path(dir: &str, name: &str) -> String {
    if dir.is_empty() { name.to_string() } else { format!("{dir}/{name}") }
}

/// Collapses `.` and `..` segments; ZIP entry names always use `/`.
fn normalize_zip_path(name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Lowercased extension (with dot) of a ZIP entry name or href.
fn zip_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

fn media_type_extension(media_type: &str) -> Option<&'static str> {
    match media_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/svg+xml" => Some(".svg"),
        _ => None,
    }
}
