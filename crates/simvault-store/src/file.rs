use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Component, Path, PathBuf};

use simvault_types::{Location, Metadata};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::backend::{Backend, BackendStream};
use crate::error::{StoreError, StoreResult};
use crate::validator::IntegrityValidator;

/// Filesystem storage backend.
///
/// Locations map directly to relative paths under `root_dir`; intermediate
/// directories are created on demand. Writes go to a temporary file in the
/// target directory and are renamed into place, so a reader never observes
/// a half-written blob.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root_dir: PathBuf,
}

impl FileStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Maps a location to a path under `root_dir`.
    ///
    /// Every non-empty segment must be a plain file or directory name; `.`,
    /// `..`, drive prefixes and embedded separators are rejected so the
    /// result never leaves the root.
    fn as_path(&self, location: &Location) -> StoreResult<PathBuf> {
        let mut path = self.root_dir.clone();
        for segment in location.segments().filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            let plain = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            );
            if !plain || segment.contains(['\\', ':']) {
                return Err(StoreError::invalid(
                    location,
                    format!("segment '{segment}' does not name an entry under the root"),
                ));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl Backend for FileStorage {
    fn name(&self) -> &'static str {
        "FileStorage"
    }

    fn store(&self, location: &Location, data: &[u8]) -> StoreResult<Metadata> {
        let path = self.as_path(location)?;
        let directory = path.parent().unwrap_or(&self.root_dir);
        fs::create_dir_all(directory)?;

        let mut tmp = NamedTempFile::new_in(directory)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(%location, path = %path.display(), bytes = data.len(), "stored file");
        self.get_metadata(location)
    }

    fn load(&self, location: &Location) -> StoreResult<BackendStream> {
        let path = self.as_path(location)?;
        let file = File::open(&path).map_err(|e| StoreError::missing(location, e.to_string()))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn delete(&self, location: &Location) -> StoreResult<()> {
        let path = self.as_path(location)?;
        if !self.exists(location)? {
            return Err(StoreError::missing(
                location,
                format!("unable to delete '{}': file does not exist", path.display()),
            ));
        }
        fs::remove_file(&path)?;
        debug!(%location, "deleted file");
        Ok(())
    }

    fn exists(&self, location: &Location) -> StoreResult<bool> {
        Ok(self.as_path(location)?.is_file())
    }

    fn get_filename(&self, location: &Location) -> StoreResult<PathBuf> {
        self.as_path(location)
    }
}
