use std::io::Read;

use simvault_crypto::ContentHasher;
use simvault_types::{Digest, Location, Metadata};
use tracing::warn;

use crate::backend::Backend;
use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};

/// Detects drift between the data written and the data about to be read.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegrityValidator {
    config: StorageConfig,
}

impl IntegrityValidator {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Digest of a byte slice.
    pub fn compute_digest(data: &[u8]) -> Digest {
        ContentHasher::DATA.hash(data)
    }

    /// Digest of everything readable from `reader`.
    pub fn digest_reader<R: Read + ?Sized>(reader: &mut R) -> StoreResult<Digest> {
        Ok(ContentHasher::DATA.hash_reader(reader)?)
    }

    pub fn config(&self) -> StorageConfig {
        self.config
    }

    /// Compare the current metadata at `location` with `expected`.
    ///
    /// A mismatch fails with [`StoreError::ResourceChanged`] unless
    /// `allow_changed` is configured, in which case it is logged and the
    /// read proceeds.
    pub fn validate(
        &self,
        backend: &dyn Backend,
        location: &Location,
        expected: &Metadata,
    ) -> StoreResult<()> {
        let actual = backend.get_metadata(location)?;
        if actual == *expected {
            return Ok(());
        }

        if self.config.allow_changed {
            warn!(
                %location,
                expected = %expected.digest,
                actual = %actual.digest,
                "hash mismatch: this object may have changed"
            );
            Ok(())
        } else {
            Err(StoreError::ResourceChanged {
                location: location.clone(),
                expected: expected.digest,
                actual: actual.digest,
            })
        }
    }
}
