//! Cover image file management for the shared `.covers` cache.

use crate::error::{ErrorKind, Result};
use crate::UploadStream;
use exn::ResultExt;
use quire_extract::COVER_EXTENSIONS;
use std::path::{Path, PathBuf};

/// Replaces the cached cover for a book: removes any previous cover file
/// regardless of extension, then streams the new image to `{id}{ext}`.
/// A half-written destination is removed when the stream fails.
pub async fn replace(covers_dir: &Path, id: &str, ext: &str, src: UploadStream<'_>) -> Result<PathBuf> {
    remove(covers_dir, id).await;
    let dest = covers_dir.join(format!("{id}{ext}"));
    let mut out = tokio::fs::File::create(&dest).await.or_raise(|| ErrorKind::Io)?;
    if let Err(err) = tokio::io::copy(src, &mut out).await {
        drop(out);
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(err).or_raise(|| ErrorKind::Io);
    }
    Ok(dest)
}

/// Best-effort removal of every cached cover extension for a book id.
pub async fn remove(covers_dir: &Path, id: &str) {
    for ext in COVER_EXTENSIONS {
        let path = covers_dir.join(format!("{id}{ext}"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "could not remove cached cover"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_removes_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("id1.jpg"), b"old-jpg").unwrap();
        std::fs::write(dir.path().join("id1.gif"), b"old-gif").unwrap();

        let mut src: &[u8] = b"new-png";
        let dest = replace(dir.path(), "id1", ".png", &mut src).await.unwrap();
        assert_eq!(dest, dir.path().join("id1.png"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"new-png");
        assert!(!dir.path().join("id1.jpg").exists());
        assert!(!dir.path().join("id1.gif").exists());
    }

    #[tokio::test]
    async fn test_remove_is_silent_when_nothing_cached() {
        let dir = tempfile::tempdir().unwrap();
        remove(dir.path(), "nothing-here").await;
    }
}
