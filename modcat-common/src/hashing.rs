//! Content hashing for artifact deduplication
//!
//! Artifacts coming from different registries are matched by the SHA-512 of
//! their bytes. The digest is rendered as 128 lowercase hex characters.

use sha2::{Digest, Sha512};

/// Length of a rendered digest in hex characters
pub const DIGEST_HEX_LEN: usize = 128;

/// Number of hex characters of the digest used in persisted artifact identifiers
pub const SHORT_HASH_LEN: usize = 16;

/// Compute the SHA-512 digest of `bytes` as lowercase hex
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finish()
}

/// Incremental hasher for content arriving in chunks (e.g. a streamed download)
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha512,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Consume the hasher and render the digest
    pub fn finish(self) -> String {
        // `{:x}` on the GenericArray pads every byte to two digits
        format!("{:x}", self.inner.finalize())
    }
}

/// Leading part of a content hash used in `<loader>:<slug>:<short>` identifiers
///
/// Hashes shorter than [`SHORT_HASH_LEN`] are returned whole.
pub fn short_hash(content_hash: &str) -> &str {
    match content_hash.char_indices().nth(SHORT_HASH_LEN) {
        Some((idx, _)) => &content_hash[..idx],
        None => content_hash,
    }
}

/// True if `value` looks like a rendered digest
pub fn is_valid_digest(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
