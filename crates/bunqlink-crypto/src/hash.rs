//! Hashing utilities for bunqlink

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Fingerprint of an API key, stored to detect key rotation
///
/// The key itself is never persisted by the orchestrator; only this digest.
pub fn api_key_fingerprint(api_key: &str) -> String {
    sha256_hex(api_key.trim().as_bytes())
}
