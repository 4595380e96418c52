//! Publication metadata extraction for the quire catalog.
//!
//! This crate turns file paths into [`Book`](models::Book) records. EPUB
//! files get full treatment (OPF metadata, series derivation, cover image
//! caching); anything else is indexed from path and stat alone. Everything
//! here is synchronous and file-handle-tidy, so the catalog backends run it
//! inside `tokio::task::spawn_blocking`.

pub mod error;
mod epub;
mod id;
pub mod models;

pub use crate::epub::{cover_path, parse_book, parse_path};
pub use crate::id::path_to_id;

/// Cover cache extensions, in lookup order.
pub const COVER_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
