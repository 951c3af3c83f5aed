//! Hashing utilities for profile digests and redaction placeholders.

use sha2::{Digest, Sha256};

/// Compute SHA256 hash of bytes.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// First `len` hex characters of the SHA256 of `s`.
pub fn short_digest(s: &str, len: usize) -> String {
    let mut digest = sha256_str(s);
    digest.truncate(len.min(digest.len()));
    digest
}
