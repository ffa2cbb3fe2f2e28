//! Content hashing for request ids and the attempt log.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `input`.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// First 12 hex characters of the SHA-256 of `input`.
#[must_use]
pub fn short_digest(input: &str) -> String {
    let mut digest = sha256_hex(input);
    digest.truncate(12);
    digest
}
