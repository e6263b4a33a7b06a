//! # SHA-256d Hashing
//!
//! Double SHA-256, the digest used for every consensus commitment on the
//! quorum layer (commitment hashes, verification vector hashes, selection
//! scores and quorum storage keys).

use sha2::{Digest, Sha256};

/// 256-bit digest.
pub type Hash = [u8; 32];

/// Streaming double SHA-256 hasher.
#[derive(Clone, Default)]
pub struct Sha256dHasher {
    inner: Sha256,
}

impl Sha256dHasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return `SHA256(SHA256(data))`.
    pub fn finalize(self) -> Hash {
        let first = self.inner.finalize();
        Sha256::digest(first).into()
    }
}

/// Single SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Double SHA-256 (one-shot).
pub fn sha256d(data: &[u8]) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher.update(data);
    hasher.finalize()
}
