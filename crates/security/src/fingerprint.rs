//! One-way input fingerprints for logs.

use ctxloom_core::estimate_tokens;
use sha2::{Digest, Sha256};

/// SHA-256 of `text` as lowercase hex.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// What audit records may say about a caller's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFingerprint {
    pub token_count: usize,
    pub hash: String,
}

impl InputFingerprint {
    pub fn of(text: &str) -> Self {
        Self {
            token_count: estimate_tokens(text),
            hash: sha256_hex(text),
        }
    }
}
