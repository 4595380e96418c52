//! Upload reception.
//!
//! Writes an incoming byte stream into the library root without ever
//! exposing a partially-written destination file: the stream drains into a
//! `.upload-*.tmp` sibling which is atomically renamed into place only
//! once fully written. The temp file is removed on every failure path.

use crate::error::{ErrorKind, Result};
use crate::UploadStream;
use exn::ResultExt;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Receives an uploaded publication into `root` and returns its final path.
///
/// `filename` is reduced to its basename (any path components are
/// stripped); only `.epub` and `.pdf` are accepted; an existing file with
/// the destination name is rejected as a duplicate. The stream is always
/// fully consumed or abandoned by the time this returns.
pub async fn receive(root: &Path, filename: &str, src: UploadStream<'_>) -> Result<PathBuf> {
    let basename = Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = Path::new(&basename)
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default();
    if !matches!(extension.as_str(), ".epub" | ".pdf") {
        exn::bail!(ErrorKind::Unsupported(extension));
    }

    let dest = root.join(&basename);
    if tokio::fs::try_exists(&dest).await.or_raise(|| ErrorKind::Io)? {
        exn::bail!(ErrorKind::Duplicate(basename));
    }

    // Temp file in the same directory so the final rename stays on one
    // filesystem and is therefore atomic.
    let tmp = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".tmp")
        .tempfile_in(root)
        .or_raise(|| ErrorKind::Io)?;
    let (file, tmp_path) = tmp.into_parts();
    let mut out = tokio::fs::File::from_std(file);
    if let Err(err) = tokio::io::copy(src, &mut out).await {
        drop(out);
        drop(tmp_path); // removes the temp file
        return Err(err).or_raise(|| ErrorKind::Io);
    }
    out.sync_all().await.or_raise(|| ErrorKind::Io)?;
    drop(out);

    tmp_path.persist(&dest).or_raise(|| ErrorKind::Io)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::ops::Deref;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Emits a few bytes, then fails, like a client hanging up mid-upload.
    struct TruncatedStream {
        sent: bool,
    }

    impl AsyncRead for TruncatedStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::other("stream truncated")));
            }
            self.sent = true;
            buf.put_slice(b"partial contents");
            Poll::Ready(Ok(()))
        }
    }

    fn library_entries(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_receive_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut src: &[u8] = b"epub bytes";
        let dest = receive(dir.path(), "book.epub", &mut src).await.unwrap();
        assert_eq!(dest, dir.path().join("book.epub"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"epub bytes");
        assert_eq!(library_entries(dir.path()), vec!["book.epub"]);
    }

    #[tokio::test]
    async fn test_receive_strips_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let mut src: &[u8] = b"pdf";
        let dest = receive(dir.path(), "../../etc/evil.pdf", &mut src).await.unwrap();
        assert_eq!(dest, dir.path().join("evil.pdf"));
    }

    #[tokio::test]
    async fn test_receive_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut src: &[u8] = b"data";
        let err = receive(dir.path(), "script.exe", &mut src).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Unsupported(ext) if ext == ".exe"));
        assert!(library_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_receive_rejects_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("book.epub"), b"existing").unwrap();
        let mut src: &[u8] = b"new";
        let err = receive(dir.path(), "book.epub", &mut src).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Duplicate(name) if name == "book.epub"));
        // The existing file is untouched.
        assert_eq!(std::fs::read(dir.path().join("book.epub")).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn test_truncated_stream_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = TruncatedStream { sent: false };
        let err = receive(dir.path(), "book.epub", &mut src).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Io));
        // Neither the destination nor any .upload-*.tmp file remains.
        assert!(library_entries(dir.path()).is_empty());
    }
}
