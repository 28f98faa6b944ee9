use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Metadata describing the bytes currently stored at a location.
///
/// Metadata is only ever obtained *after* data has been written, because some
/// backends can only report fields (such as modification stamps) once the
/// write has completed. It is used for integrity validation and never for
/// addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metadata {
    /// Content digest of the stored bytes.
    pub digest: Digest,
}

impl Metadata {
    pub fn new(digest: Digest) -> Self {
        Self { digest }
    }
}

impl From<Digest> for Metadata {
    fn from(digest: Digest) -> Self {
        Self::new(digest)
    }
}
