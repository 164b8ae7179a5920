//! Content digests used as cache fingerprints.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `content`.
///
/// # Example
///
/// ```
/// use quill_cache::content_hash;
///
/// let hash = content_hash("hello");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, content_hash(b"hello"));
/// ```
#[must_use]
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    hex::encode(hasher.finalize())
}
