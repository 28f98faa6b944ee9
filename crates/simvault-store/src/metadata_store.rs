use std::collections::BTreeMap;
use std::sync::RwLock;

use simvault_types::{Location, Metadata};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::external::ExternalStorage;

/// Location at which [`JsonMetadataStore`] persists its map.
pub const METADATA_LOCATION: &str = "metadata.json";

/// Records which locations are known and the metadata they were stored with.
///
/// Implementations must be thread-safe and keep `locations()` sorted so that
/// iteration is deterministic.
pub trait MetadataStore: Send + Sync {
    /// Record (or replace) the metadata for `location`.
    fn store_metadata(&self, location: &Location, metadata: Metadata) -> StoreResult<()>;

    /// Metadata recorded for `location`, if any.
    fn get(&self, location: &Location) -> StoreResult<Option<Metadata>>;

    /// Forget `location`. Returns `true` if it was known.
    fn remove(&self, location: &Location) -> StoreResult<bool>;

    /// Every known location, sorted.
    fn locations(&self) -> StoreResult<Vec<Location>>;

    /// Number of known locations.
    fn len(&self) -> StoreResult<usize> {
        Ok(self.locations()?.len())
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, location: &Location) -> StoreResult<bool> {
        Ok(self.get(location)?.is_some())
    }

    /// Metadata for `location`, failing with `ResourceMissing` if unknown.
    fn metadata_for(&self, location: &Location) -> StoreResult<Metadata> {
        self.get(location)?.ok_or_else(|| {
            StoreError::missing(location, format!("hash for '{location}' not found"))
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryMetadataStore
// ---------------------------------------------------------------------------

/// Metadata held only in memory; lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<BTreeMap<Location, Metadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn store_metadata(&self, location: &Location, metadata: Metadata) -> StoreResult<()> {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(location.clone(), metadata);
        Ok(())
    }

    fn get(&self, location: &Location) -> StoreResult<Option<Metadata>> {
        Ok(self.entries.read().expect("lock poisoned").get(location).copied())
    }

    fn remove(&self, location: &Location) -> StoreResult<bool> {
        Ok(self
            .entries
            .write()
            .expect("lock poisoned")
            .remove(location)
            .is_some())
    }

    fn locations(&self) -> StoreResult<Vec<Location>> {
        Ok(self.entries.read().expect("lock poisoned").keys().cloned().collect())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().expect("lock poisoned").len())
    }
}

// ---------------------------------------------------------------------------
// JsonMetadataStore
// ---------------------------------------------------------------------------

/// Metadata persisted as one JSON object at [`METADATA_LOCATION`].
///
/// The whole map is rewritten on every change. That keeps the format trivial
/// to inspect but makes each write O(n) in the number of known locations.
/// The cached map only changes once the rewrite has succeeded.
pub struct JsonMetadataStore {
    storage: ExternalStorage,
    location: Location,
    cache: RwLock<BTreeMap<Location, Metadata>>,
}

impl JsonMetadataStore {
    /// Open the metadata file in `storage`, starting empty if there is none.
    pub fn open(storage: ExternalStorage) -> StoreResult<Self> {
        let location = Location::new(METADATA_LOCATION);
        let cache = Self::load_all_metadata(&storage, &location)?;
        debug!(entries = cache.len(), "loaded metadata");
        Ok(Self {
            storage,
            location,
            cache: RwLock::new(cache),
        })
    }

    /// Read the persisted map straight from storage.
    ///
    /// The metadata file has no recorded digest of its own, so it is read
    /// against its current metadata.
    pub fn load_all_metadata(
        storage: &ExternalStorage,
        location: &Location,
    ) -> StoreResult<BTreeMap<Location, Metadata>> {
        if !storage.exists(location)? {
            return Ok(BTreeMap::new());
        }
        let current = storage.get_metadata(location)?;
        let bytes = storage.load_stream(location, &current)?.read_to_vec()?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn persist(&self, map: &BTreeMap<Location, Metadata>) -> StoreResult<()> {
        let bytes =
            serde_json::to_vec(map).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.storage.store(&self.location, &bytes)?;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    fn store_metadata(&self, location: &Location, metadata: Metadata) -> StoreResult<()> {
        let mut map = self.cache.write().expect("lock poisoned");
        let mut next = map.clone();
        next.insert(location.clone(), metadata);
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn get(&self, location: &Location) -> StoreResult<Option<Metadata>> {
        Ok(self.cache.read().expect("lock poisoned").get(location).copied())
    }

    fn remove(&self, location: &Location) -> StoreResult<bool> {
        let mut map = self.cache.write().expect("lock poisoned");
        if !map.contains_key(location) {
            return Ok(false);
        }
        let mut next = map.clone();
        next.remove(location);
        self.persist(&next)?;
        *map = next;
        Ok(true)
    }

    fn locations(&self) -> StoreResult<Vec<Location>> {
        Ok(self.cache.read().expect("lock poisoned").keys().cloned().collect())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.cache.read().expect("lock poisoned").len())
    }
}

impl std::fmt::Debug for JsonMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonMetadataStore")
            .field("location", &self.location)
            .field("entries", &self.cache.read().expect("lock poisoned").len())
            .finish()
    }
}
