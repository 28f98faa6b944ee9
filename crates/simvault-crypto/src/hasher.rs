use std::io::Read;

use simvault_types::Digest;

/// Read buffer size for streaming digests.
const CHUNK_SIZE: usize = 64 * 1024;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"simvault-data-v1"`) that is
/// prepended to every hash computation, so a stored blob and an object token
/// computed over identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for the integrity digest of stored bytes.
    pub const DATA: Self = Self {
        domain: "simvault-data-v1",
    };
    /// Hasher for tokenizable object tokens.
    pub const TOKEN: Self = Self {
        domain: "simvault-token-v1",
    };
    /// Hasher for non-string hierarchical path segments.
    pub const SEGMENT: Self = Self {
        domain: "simvault-segment-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = self.start();
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash everything readable from `reader`, in fixed-size chunks.
    pub fn hash_reader<R: Read + ?Sized>(&self, reader: &mut R) -> std::io::Result<Digest> {
        let mut hasher = self.start();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest::from_hash(*hasher.finalize().as_bytes()))
    }

    /// Hash a serializable value as canonical JSON with domain separation.
    ///
    /// Canonical here means `serde_json` without `preserve_order`: object keys
    /// are emitted sorted, so equal values always hash equally.
    pub fn hash_json<T: serde::Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Digest, HasherError> {
        let value =
            serde_json::to_value(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        let data =
            serde_json::to_vec(&value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
