use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use simvault_types::{Location, Metadata};
use tracing::debug;

use crate::backend::{Backend, BackendStream};
use crate::error::{StoreError, StoreResult};
use crate::validator::IntegrityValidator;

/// In-memory, HashMap-based storage backend.
///
/// Not for production use. Blobs are held behind a `RwLock` and shared with
/// open streams, so a stream keeps reading the bytes that were current when
/// it was opened even if the location is overwritten meanwhile.
pub struct MemoryStorage {
    data: RwLock<HashMap<Location, Arc<[u8]>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of locations currently holding data.
    pub fn len(&self) -> usize {
        self.data.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.data
            .read()
            .expect("lock poisoned")
            .values()
            .map(|blob| blob.len() as u64)
            .sum()
    }

    /// Sorted list of every location holding data.
    pub fn all_locations(&self) -> Vec<Location> {
        let map = self.data.read().expect("lock poisoned");
        let mut locations: Vec<Location> = map.keys().cloned().collect();
        locations.sort();
        locations
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryStorage {
    fn name(&self) -> &'static str {
        "MemoryStorage"
    }

    fn store(&self, location: &Location, data: &[u8]) -> StoreResult<Metadata> {
        let digest = IntegrityValidator::compute_digest(data);
        let mut map = self.data.write().expect("lock poisoned");
        map.insert(location.clone(), Arc::from(data));
        debug!(%location, bytes = data.len(), "stored in memory");
        Ok(Metadata::new(digest))
    }

    fn load(&self, location: &Location) -> StoreResult<BackendStream> {
        let map = self.data.read().expect("lock poisoned");
        let blob = map
            .get(location)
            .cloned()
            .ok_or_else(|| StoreError::missing(location, "key does not exist"))?;
        Ok(Box::new(Cursor::new(blob)))
    }

    fn delete(&self, location: &Location) -> StoreResult<()> {
        let mut map = self.data.write().expect("lock poisoned");
        match map.remove(location) {
            Some(_) => Ok(()),
            None => Err(StoreError::missing(
                location,
                format!("unable to delete '{location}': key does not exist"),
            )),
        }
    }

    fn exists(&self, location: &Location) -> StoreResult<bool> {
        let map = self.data.read().expect("lock poisoned");
        Ok(map.contains_key(location))
    }

    fn get_metadata(&self, location: &Location) -> StoreResult<Metadata> {
        let map = self.data.read().expect("lock poisoned");
        let blob = map
            .get(location)
            .ok_or_else(|| StoreError::missing(location, "key does not exist"))?;
        Ok(Metadata::new(IntegrityValidator::compute_digest(blob)))
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("location_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_all(backend: &MemoryStorage, loc: &Location) -> Vec<u8> {
        let mut buf = Vec::new();
        backend.load(loc).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn store_and_load() {
        let backend = MemoryStorage::new();
        let loc = Location::new("path/to/foo.txt");
        backend.store(&loc, b"foo").unwrap();
        assert_eq!(read_all(&backend, &loc), b"foo");
    }

    #[test]
    fn store_returns_digest_of_data() {
        let backend = MemoryStorage::new();
        let md = backend.store(&Location::new("x"), b"foo").unwrap();
        assert_eq!(md.digest, IntegrityValidator::compute_digest(b"foo"));
    }

    #[test]
    fn overwrite_replaces_data() {
        let backend = MemoryStorage::new();
        let loc = Location::new("x");
        backend.store(&loc, b"one").unwrap();
        backend.store(&loc, b"two").unwrap();
        assert_eq!(read_all(&backend, &loc), b"two");
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn load_missing_is_resource_missing() {
        let backend = MemoryStorage::new();
        let err = backend.load(&Location::new("missing")).err().unwrap();
        assert!(err.is_missing());
    }

    // -----------------------------------------------------------------------
    // Exists / Delete
    // -----------------------------------------------------------------------

    #[test]
    fn exists_tracks_presence() {
        let backend = MemoryStorage::new();
        let loc = Location::new("x");
        assert!(!backend.exists(&loc).unwrap());
        backend.store(&loc, b"").unwrap();
        assert!(backend.exists(&loc).unwrap());
    }

    #[test]
    fn delete_removes_data() {
        let backend = MemoryStorage::new();
        let loc = Location::new("x");
        backend.store(&loc, b"bye").unwrap();
        backend.delete(&loc).unwrap();
        assert!(!backend.exists(&loc).unwrap());
    }

    #[test]
    fn delete_missing_is_resource_missing() {
        let backend = MemoryStorage::new();
        let err = backend.delete(&Location::new("never-written")).unwrap_err();
        assert!(err.is_missing());
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    #[test]
    fn metadata_is_stable_until_data_changes() {
        let backend = MemoryStorage::new();
        let loc = Location::new("x");
        backend.store(&loc, b"one").unwrap();
        let a = backend.get_metadata(&loc).unwrap();
        let b = backend.get_metadata(&loc).unwrap();
        assert_eq!(a, b);

        backend.store(&loc, b"two").unwrap();
        assert_ne!(backend.get_metadata(&loc).unwrap(), a);
    }

    #[test]
    fn metadata_missing_is_resource_missing() {
        let backend = MemoryStorage::new();
        assert!(backend
            .get_metadata(&Location::new("x"))
            .unwrap_err()
            .is_missing());
    }

    #[test]
    fn get_filename_is_unsupported() {
        let backend = MemoryStorage::new();
        let loc = Location::new("x");
        backend.store(&loc, b"").unwrap();
        assert!(matches!(
            backend.get_filename(&loc),
            Err(StoreError::Unsupported { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Utility methods
    // -----------------------------------------------------------------------

    #[test]
    fn len_total_bytes_and_locations() {
        let backend = MemoryStorage::new();
        assert!(backend.is_empty());
        backend.store(&Location::new("b"), b"12345").unwrap();
        backend.store(&Location::new("a"), b"123456789").unwrap();
        assert_eq!(backend.len(), 2);
        assert_eq!(backend.total_bytes(), 14);
        assert_eq!(
            backend.all_locations(),
            vec![Location::new("a"), Location::new("b")]
        );
    }

    #[test]
    fn open_stream_survives_overwrite() {
        let backend = MemoryStorage::new();
        let loc = Location::new("x");
        backend.store(&loc, b"before").unwrap();
        let mut stream = backend.load(&loc).unwrap();
        backend.store(&loc, b"after").unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"before");
    }

    #[test]
    fn debug_format() {
        let backend = MemoryStorage::new();
        let debug = format!("{backend:?}");
        assert!(debug.contains("MemoryStorage"));
        assert!(debug.contains("location_count"));
    }
}
