//! Hashing - SHA-256 Content Fingerprints
//!
//! Exported files are hashed over their bytes; artifacts over their JSON
//! wire form, whose field order is fixed by the struct.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn compute_content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&serde_json::to_vec(value)?))
}
