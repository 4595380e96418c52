//! Recursive discovery of catalog-eligible files.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions (lowercase, without dot) recognized as publications.
pub const BOOK_EXTENSIONS: [&str; 2] = ["epub", "pdf"];

/// Returns `true` if the path has a recognized publication extension
/// (matched case-insensitively).
pub fn is_book_file(path: &Path) -> bool {
    extension_matches(path, &BOOK_EXTENSIONS)
}

/// Returns `true` if the path has an `.epub` extension.
pub fn is_epub(path: &Path) -> bool {
    extension_matches(path, &["epub"])
}

fn extension_matches(path: &Path, accepted: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| accepted.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

/// Walks `root` recursively and collects every publication file path.
///
/// Unreadable directory entries are skipped rather than failing the scan;
/// a missing root simply yields an empty set.
pub fn book_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_book_file(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("novel.epub", true)]
    #[case("manual.PDF", true)]
    #[case("Nested.EPub", true)]
    #[case("notes.txt", false)]
    #[case("epub", false)]
    fn test_is_book_file(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_book_file(Path::new(name)), expected);
    }

    #[test]
    fn test_book_files_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shelf/sub")).unwrap();
        std::fs::write(dir.path().join("a.epub"), b"a").unwrap();
        std::fs::write(dir.path().join("shelf/b.pdf"), b"b").unwrap();
        std::fs::write(dir.path().join("shelf/sub/c.EPUB"), b"c").unwrap();
        std::fs::write(dir.path().join("shelf/readme.md"), b"-").unwrap();

        let mut found = book_files(dir.path());
        found.sort();
        assert_eq!(
            found,
            vec![
                dir.path().join("a.epub"),
                dir.path().join("shelf/b.pdf"),
                dir.path().join("shelf/sub/c.EPUB"),
            ]
        );
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        assert!(book_files(Path::new("/definitely/not/a/real/library")).is_empty());
    }
}
