use std::path::PathBuf;
use std::sync::Arc;

use simvault_types::{Location, Metadata};
use tracing::debug;

use crate::backend::Backend;
use crate::config::StorageConfig;
use crate::error::StoreResult;
use crate::stream::ScopedStream;
use crate::validator::IntegrityValidator;

/// A backend paired with an integrity validator.
///
/// Every read through `ExternalStorage` is validated against the metadata
/// the caller recorded at write time. Cloning is cheap and shares the
/// backend.
#[derive(Clone)]
pub struct ExternalStorage {
    backend: Arc<dyn Backend>,
    validator: IntegrityValidator,
}

impl ExternalStorage {
    /// Wrap a backend with strict validation.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_config(backend, StorageConfig::default())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: StorageConfig) -> Self {
        Self {
            backend,
            validator: IntegrityValidator::new(config),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub fn config(&self) -> StorageConfig {
        self.validator.config()
    }

    /// Store bytes and return the location with the resulting metadata.
    pub fn store(&self, location: &Location, data: &[u8]) -> StoreResult<(Location, Metadata)> {
        let metadata = self.backend.store(location, data)?;
        debug!(%location, digest = %metadata.digest, "stored");
        Ok((location.clone(), metadata))
    }

    /// Validate `location` against `expected`, then open it for reading.
    pub fn load_stream(
        &self,
        location: &Location,
        expected: &Metadata,
    ) -> StoreResult<ScopedStream> {
        self.validate(location, expected)?;
        let reader = self.backend.load(location)?;
        debug!(%location, "opened validated stream");
        Ok(ScopedStream::new(location.clone(), reader))
    }

    /// Validate `location` against `expected`, then return its on-disk path.
    pub fn get_filename(&self, location: &Location, expected: &Metadata) -> StoreResult<PathBuf> {
        self.validate(location, expected)?;
        self.backend.get_filename(location)
    }

    pub fn validate(&self, location: &Location, expected: &Metadata) -> StoreResult<()> {
        self.validator.validate(&*self.backend, location, expected)
    }

    pub fn get_metadata(&self, location: &Location) -> StoreResult<Metadata> {
        self.backend.get_metadata(location)
    }

    pub fn delete(&self, location: &Location) -> StoreResult<()> {
        self.backend.delete(location)?;
        debug!(%location, "deleted");
        Ok(())
    }

    pub fn exists(&self, location: &Location) -> StoreResult<bool> {
        self.backend.exists(location)
    }
}

impl std::fmt::Debug for ExternalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalStorage")
            .field("backend", &self.backend.name())
            .field("config", &self.validator.config())
            .finish()
    }
}
