//! Integrity-validated storage for simvault.
//!
//! This crate stores opaque byte blobs under string [`Location`]s and makes
//! sure that what comes back out is what went in. Every validated read first
//! recomputes the digest of the stored data and compares it with the
//! digest recorded at write time.
//!
//! # Layers
//!
//! - [`Backend`] -- raw byte put/get/delete/exists keyed by location
//!   - [`FileStorage`] -- files under a root directory
//!   - [`MemoryStorage`] -- `HashMap`-based store for tests and embedding
//! - [`IntegrityValidator`] -- digest computation and drift detection
//! - [`ExternalStorage`] -- backend + validator; validated reads return a
//!   [`ScopedStream`] that can only be consumed inside a closure
//! - [`MetadataStore`] -- records the known `(location, metadata)` pairs
//! - [`ResultServer`] -- external storage + metadata store; callers no longer
//!   need to know metadata exists
//!
//! # Design Rules
//!
//! 1. All operations block until the backend has completed them.
//! 2. Backends never deduplicate; the layer above decides whether to write.
//! 3. A digest mismatch is fatal unless [`StorageConfig::allow_changed`] is set.
//! 4. Stream handles are released on every exit path, including errors.
//!
//! [`Location`]: simvault_types::Location

pub mod backend;
pub mod config;
pub mod error;
pub mod external;
pub mod file;
pub mod memory;
pub mod metadata_store;
pub mod server;
pub mod stream;
pub mod validator;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::Backend;
pub use config::StorageConfig;
pub use error::{StoreError, StoreResult};
pub use external::ExternalStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use metadata_store::{
    InMemoryMetadataStore, JsonMetadataStore, MetadataStore, METADATA_LOCATION,
};
pub use server::ResultServer;
pub use stream::ScopedStream;
pub use validator::IntegrityValidator;
