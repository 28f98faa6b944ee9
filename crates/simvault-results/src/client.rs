use std::sync::Arc;

use simvault_store::{ExternalStorage, ResultServer, StoreResult};
use simvault_types::{Location, Metadata, PathSegment, TokenKey};
use tracing::info;

use crate::cache::DecodeCache;
use crate::error::ResultsResult;
use crate::graph::{store_graph, GraphLoader, StoreReport};
use crate::node::{Entry, ResultNode};
use crate::tokenizable::{downcast, Tokenizable, TokenizableRegistry};

/// Location of the result tree's root.
pub const ROOT_PATH: &str = "transformations";

/// Namespace prefix for transformation and network records.
pub const SETUP_PREFIX: &str = "setup";

/// Entry point to stored simulation results.
///
/// Owns the root of the result tree, the server that backs it, the class
/// registry used to rebuild objects, and a decode cache that lives as long
/// as the client, so every load through one client shares instances.
pub struct ResultClient {
    root: Arc<ResultNode>,
    registry: TokenizableRegistry,
    cache: DecodeCache,
}

impl ResultClient {
    pub fn new(server: ResultServer, registry: TokenizableRegistry) -> Self {
        Self {
            root: ResultNode::root(Arc::new(server), ROOT_PATH),
            registry,
            cache: DecodeCache::new(),
        }
    }

    /// Client whose metadata is persisted as JSON inside `storage`.
    pub fn open(storage: ExternalStorage, registry: TokenizableRegistry) -> StoreResult<Self> {
        let server = ResultServer::with_json_metadata(storage)?;
        Ok(Self::new(server, registry))
    }

    /// Root node of the result tree.
    pub fn root(&self) -> &Arc<ResultNode> {
        &self.root
    }

    pub fn server(&self) -> &ResultServer {
        self.root.server()
    }

    pub fn registry(&self) -> &TokenizableRegistry {
        &self.registry
    }

    pub fn decode_cache(&self) -> &DecodeCache {
        &self.cache
    }

    /// Index the root; see [`ResultNode::get`].
    pub fn get(&self, item: impl Into<PathSegment>) -> ResultsResult<Entry> {
        self.root.get(item)
    }

    /// The transformation-level node for `item`.
    pub fn transformation(&self, item: impl Into<PathSegment>) -> ResultsResult<Arc<ResultNode>> {
        self.root.child(item)
    }

    /// Write raw bytes, e.g. a leaf file at `node.path()/<name>`.
    pub fn store_bytes(&self, location: &Location, data: &[u8]) -> ResultsResult<Metadata> {
        Ok(self.server().store_bytes(location, data)?)
    }

    /// Delete a stored location and its metadata.
    pub fn delete(&self, location: &Location) -> ResultsResult<()> {
        Ok(self.server().delete(location)?)
    }

    /// Every location known to the client, sorted.
    pub fn locations(&self) -> ResultsResult<Vec<Location>> {
        Ok(self.server().locations()?)
    }

    pub fn store_transformation<T: Tokenizable + ?Sized>(
        &self,
        transformation: &T,
    ) -> ResultsResult<StoreReport> {
        self.store_tokenizable(SETUP_PREFIX, transformation)
    }

    pub fn store_network<T: Tokenizable + ?Sized>(
        &self,
        network: &T,
    ) -> ResultsResult<StoreReport> {
        self.store_tokenizable(SETUP_PREFIX, network)
    }

    pub fn load_transformation(&self, key: &TokenKey) -> ResultsResult<Arc<dyn Tokenizable>> {
        self.load_tokenizable(SETUP_PREFIX, key)
    }

    pub fn load_network(&self, key: &TokenKey) -> ResultsResult<Arc<dyn Tokenizable>> {
        self.load_tokenizable(SETUP_PREFIX, key)
    }

    /// Load an object and downcast it to `T`.
    pub fn load_as<T: Tokenizable>(&self, key: &TokenKey) -> ResultsResult<Arc<T>> {
        downcast(self.load_tokenizable(SETUP_PREFIX, key)?, key)
    }

    /// Store an object graph under `prefix`, skipping records already stored.
    pub fn store_tokenizable<T: Tokenizable + ?Sized>(
        &self,
        prefix: &str,
        obj: &T,
    ) -> ResultsResult<StoreReport> {
        let report = store_graph(self.server(), prefix, obj)?;
        if let Some(root) = &report.root {
            info!(%root, written = report.written.len(), "stored object graph");
        }
        Ok(report)
    }

    /// Rebuild the object graph rooted at `key` from records under `prefix`.
    pub fn load_tokenizable(
        &self,
        prefix: &str,
        key: &TokenKey,
    ) -> ResultsResult<Arc<dyn Tokenizable>> {
        GraphLoader::new(self.server(), &self.registry, &self.cache, prefix).load(key)
    }
}

impl std::fmt::Debug for ResultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultClient")
            .field("root", &self.root)
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish()
    }
}
