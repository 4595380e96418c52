use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::path::Path;

/// Derives the stable catalog identifier for a file path.
///
/// The id is the lowercase hex encoding of the first 8 bytes of the SHA-256
/// digest of the path bytes (16 characters). Equal paths always produce
/// equal ids; distinct paths collide only with negligible probability, and
/// the caller is responsible for path uniqueness.
pub fn path_to_id(path: impl AsRef<Path>) -> String {
    let digest = Sha256::digest(path.as_ref().as_os_str().as_encoded_bytes());
    digest[..8].iter().fold(String::with_capacity(16), |mut id, byte| {
        let _ = write!(id, "{byte:02x}");
        id
    })
}
