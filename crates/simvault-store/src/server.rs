use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use simvault_types::{Location, Metadata};
use tracing::{debug, trace};

use crate::backend::Backend;
use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::external::ExternalStorage;
use crate::metadata_store::{
    InMemoryMetadataStore, JsonMetadataStore, MetadataStore, METADATA_LOCATION,
};
use crate::stream::ScopedStream;

/// External storage plus the record of what has been stored in it.
///
/// Callers address data by location alone; the server looks up the
/// metadata recorded at write time and validates every read against it.
pub struct ResultServer {
    storage: ExternalStorage,
    metadata: Box<dyn MetadataStore>,
    /// Location owned by the metadata store, closed to callers.
    reserved: Option<Location>,
    /// Serializes check-then-write so `store_if_absent` writes at most once.
    write_gate: Mutex<()>,
}

impl ResultServer {
    pub fn new(storage: ExternalStorage, metadata: Box<dyn MetadataStore>) -> Self {
        Self {
            storage,
            metadata,
            reserved: None,
            write_gate: Mutex::new(()),
        }
    }

    /// Server whose metadata is persisted as JSON inside `storage` itself.
    ///
    /// [`METADATA_LOCATION`] then belongs to the metadata store; writes and
    /// deletes aimed at it fail with [`StoreError::InvalidLocation`].
    pub fn with_json_metadata(storage: ExternalStorage) -> StoreResult<Self> {
        let metadata = JsonMetadataStore::open(storage.clone())?;
        Ok(Self {
            reserved: Some(Location::new(METADATA_LOCATION)),
            ..Self::new(storage, Box::new(metadata))
        })
    }

    /// Server with in-memory metadata, convenient for tests.
    pub fn in_memory(backend: Arc<dyn Backend>, config: StorageConfig) -> Self {
        Self::new(
            ExternalStorage::with_config(backend, config),
            Box::new(InMemoryMetadataStore::new()),
        )
    }

    pub fn storage(&self) -> &ExternalStorage {
        &self.storage
    }

    pub fn metadata_store(&self) -> &dyn MetadataStore {
        &*self.metadata
    }

    fn check_writable(&self, location: &Location) -> StoreResult<()> {
        let Some(reserved) = &self.reserved else {
            return Ok(());
        };
        let named = |l: &Location| {
            l.segments()
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        };
        if named(location) == named(reserved) {
            return Err(StoreError::invalid(location, "reserved for result metadata"));
        }
        Ok(())
    }

    /// Store bytes and record their metadata.
    pub fn store_bytes(&self, location: &Location, data: &[u8]) -> StoreResult<Metadata> {
        self.check_writable(location)?;
        let _gate = self.write_gate.lock().expect("lock poisoned");
        self.store_locked(location, data)
    }

    /// Store bytes unless `location` is already known. Returns `true` if a
    /// write happened.
    pub fn store_if_absent(&self, location: &Location, data: &[u8]) -> StoreResult<bool> {
        self.check_writable(location)?;
        let _gate = self.write_gate.lock().expect("lock poisoned");
        if self.metadata.contains(location)? {
            trace!(%location, "already known, skipping write");
            return Ok(false);
        }
        self.store_locked(location, data)?;
        Ok(true)
    }

    fn store_locked(&self, location: &Location, data: &[u8]) -> StoreResult<Metadata> {
        let (location, metadata) = self.storage.store(location, data)?;
        self.metadata.store_metadata(&location, metadata)?;
        Ok(metadata)
    }

    /// Open a validated stream using the recorded metadata.
    pub fn load_stream(&self, location: &Location) -> StoreResult<ScopedStream> {
        let metadata = self.metadata.metadata_for(location)?;
        self.storage.load_stream(location, &metadata)
    }

    /// Read a whole record through a validated stream.
    pub fn load_bytes(&self, location: &Location) -> StoreResult<Vec<u8>> {
        self.load_stream(location)?.read_to_vec()
    }

    /// Validated filesystem path for backends that have one.
    pub fn get_filename(&self, location: &Location) -> StoreResult<PathBuf> {
        let metadata = self.metadata.metadata_for(location)?;
        self.storage.get_filename(location, &metadata)
    }

    /// Delete the data and forget its metadata.
    pub fn delete(&self, location: &Location) -> StoreResult<()> {
        self.check_writable(location)?;
        let _gate = self.write_gate.lock().expect("lock poisoned");
        self.storage.delete(location)?;
        self.metadata.remove(location)?;
        debug!(%location, "deleted result");
        Ok(())
    }

    /// Whether `location` has recorded metadata.
    pub fn contains(&self, location: &Location) -> StoreResult<bool> {
        self.metadata.contains(location)
    }

    /// Whether the backend currently holds data at `location`.
    pub fn exists(&self, location: &Location) -> StoreResult<bool> {
        self.storage.exists(location)
    }

    /// Every location with recorded metadata, sorted.
    pub fn locations(&self) -> StoreResult<Vec<Location>> {
        self.metadata.locations()
    }

    /// Locations listed in metadata but absent from the backend.
    pub fn find_missing_files(&self) -> StoreResult<Vec<Location>> {
        let mut missing = Vec::new();
        for location in self.metadata.locations()? {
            if !self.storage.exists(&location)? {
                missing.push(location);
            }
        }
        Ok(missing)
    }
}

impl std::fmt::Debug for ResultServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultServer")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
