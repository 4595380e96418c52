mod book;

pub use self::book::{Author, Book, BookFile, EPUB_MIME, OCTET_STREAM_MIME, PDF_MIME};
