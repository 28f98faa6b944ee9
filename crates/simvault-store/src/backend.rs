use std::io::Read;
use std::path::PathBuf;

use simvault_types::{Location, Metadata};

use crate::error::{StoreError, StoreResult};
use crate::validator::IntegrityValidator;

/// A readable byte stream handed out by a backend.
pub type BackendStream = Box<dyn Read + Send>;

/// Physical byte storage keyed by location.
///
/// All implementations must satisfy these invariants:
/// - Every operation is blocking; when it returns, the backend has finished,
///   even if the medium supports asynchronous I/O.
/// - A location holds either nothing or exactly one blob. Overwrites are
///   allowed and are never deduplicated at this layer.
/// - `load`, `delete`, and `get_metadata` on an absent location fail with
///   [`StoreError::ResourceMissing`].
/// - The backend never interprets the bytes it stores.
pub trait Backend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Write `data` at `location`, replacing anything already there, and
    /// return the metadata of what is now stored.
    fn store(&self, location: &Location, data: &[u8]) -> StoreResult<Metadata>;

    /// Open the data at `location` for reading.
    fn load(&self, location: &Location) -> StoreResult<BackendStream>;

    /// Delete the data at `location`.
    fn delete(&self, location: &Location) -> StoreResult<()>;

    /// Check whether `location` currently holds data.
    fn exists(&self, location: &Location) -> StoreResult<bool>;

    /// Metadata for the data currently at `location`.
    ///
    /// Default implementation streams the data through the integrity
    /// digest. Backends that track digests natively may override.
    fn get_metadata(&self, location: &Location) -> StoreResult<Metadata> {
        let mut stream = self.load(location)?;
        let digest = IntegrityValidator::digest_reader(&mut *stream)?;
        Ok(Metadata::new(digest))
    }

    /// Filesystem path of the data at `location`, for consumers that cannot
    /// work with a stream.
    fn get_filename(&self, _location: &Location) -> StoreResult<PathBuf> {
        Err(StoreError::Unsupported {
            backend: self.name(),
            operation: "get_filename",
        })
    }
}
