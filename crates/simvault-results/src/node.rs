use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use simvault_crypto::ContentHasher;
use simvault_store::{ResultServer, ScopedStream};
use simvault_types::{Location, PathSegment};
use tracing::trace;

use crate::error::{ResultsError, ResultsResult};
use crate::tokenizable::Tokenizable;

/// Path segment for a tokenizable object: a fixed-width hash of its key.
pub fn object_segment<T: Tokenizable + ?Sized>(obj: &T) -> ResultsResult<PathSegment> {
    let key = obj.key()?;
    Ok(PathSegment::from_digest(
        &ContentHasher::SEGMENT.hash(key.as_str().as_bytes()),
    ))
}

/// Path segment for any serializable value: a fixed-width hash of its
/// canonical JSON.
pub fn value_segment<T: Serialize + ?Sized>(value: &T) -> ResultsResult<PathSegment> {
    ContentHasher::SEGMENT
        .hash_json(value)
        .map(|digest| PathSegment::from_digest(&digest))
        .map_err(|e| ResultsError::Serialization(e.to_string()))
}

/// Depth of a node in the result tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeLevel {
    Root,
    Transformation,
    Clone,
    Extension,
}

impl NodeLevel {
    /// Level of this node's children, or `None` below an extension.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Root => Some(Self::Transformation),
            Self::Transformation => Some(Self::Clone),
            Self::Clone => Some(Self::Extension),
            Self::Extension => None,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            Self::Root => "ResultClient",
            Self::Transformation => "TransformationResult",
            Self::Clone => "CloneResult",
            Self::Extension => "ExtensionResult",
        }
    }
}

/// What indexing a node produced.
pub enum Entry {
    /// A stored file directly beneath the node.
    File(ScopedStream),
    /// A child container.
    Node(Arc<ResultNode>),
}

impl Entry {
    pub fn into_node(self) -> Option<Arc<ResultNode>> {
        match self {
            Self::Node(node) => Some(node),
            Self::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<ScopedStream> {
        match self {
            Self::File(stream) => Some(stream),
            Self::Node(_) => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(stream) => f.debug_tuple("File").field(stream.location()).finish(),
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

/// One container in the transformation → clone → extension tree.
///
/// A node holds no data, only its location and a memo of the children
/// derived from it. Children live as long as their parent and are never
/// evicted, so the same segment always yields the same instance.
pub struct ResultNode {
    level: NodeLevel,
    path: Location,
    parent: Weak<ResultNode>,
    server: Arc<ResultServer>,
    children: Mutex<HashMap<PathSegment, Arc<ResultNode>>>,
}

impl ResultNode {
    pub(crate) fn root(server: Arc<ResultServer>, path: &str) -> Arc<Self> {
        Arc::new(Self {
            level: NodeLevel::Root,
            path: Location::new(path),
            parent: Weak::new(),
            server,
            children: Mutex::new(HashMap::new()),
        })
    }

    pub fn level(&self) -> NodeLevel {
        self.level
    }

    /// Storage location of this node: its parent's path plus its own segment.
    pub fn path(&self) -> &Location {
        &self.path
    }

    /// The parent node, if it is still alive. `None` for the root.
    pub fn parent(&self) -> Option<Arc<ResultNode>> {
        self.parent.upgrade()
    }

    pub fn server(&self) -> &Arc<ResultServer> {
        &self.server
    }

    /// Number of memoized children.
    pub fn cached_children(&self) -> usize {
        self.children.lock().expect("lock poisoned").len()
    }

    /// Look up `item` beneath this node.
    ///
    /// If a file is stored at `<path>/<item>` it is opened; otherwise `item`
    /// names a child container. Below an extension everything is a file,
    /// and file handles are never cached.
    pub fn get(self: &Arc<Self>, item: impl Into<PathSegment>) -> ResultsResult<Entry> {
        let segment = item.into();
        segment.validate()?;
        let location = self.path.join(segment.as_str());

        if self.level == NodeLevel::Extension || self.server.contains(&location)? {
            trace!(%location, "opening leaf file");
            return Ok(Entry::File(self.server.load_stream(&location)?));
        }
        self.child(segment).map(Entry::Node)
    }

    /// The child container for `item`, created on first access.
    ///
    /// `item` must name a single level: empty, `.`, `..` and segments
    /// containing `/` are rejected.
    pub fn child(
        self: &Arc<Self>,
        item: impl Into<PathSegment>,
    ) -> ResultsResult<Arc<ResultNode>> {
        let level = self
            .level
            .next()
            .ok_or_else(|| ResultsError::NotAContainer(self.path.clone()))?;
        let segment = item.into();
        segment.validate()?;

        let mut children = self.children.lock().expect("lock poisoned");
        let child = children.entry(segment).or_insert_with_key(|segment| {
            trace!(parent = %self.path, %segment, "creating result node");
            Arc::new(ResultNode {
                level,
                path: self.path.join(segment.as_str()),
                parent: Arc::downgrade(self),
                server: Arc::clone(&self.server),
                children: Mutex::new(HashMap::new()),
            })
        });
        Ok(Arc::clone(child))
    }

    /// The child container for a tokenizable object.
    pub fn child_for<T: Tokenizable + ?Sized>(
        self: &Arc<Self>,
        obj: &T,
    ) -> ResultsResult<Arc<ResultNode>> {
        self.child(object_segment(obj)?)
    }

    /// Walk several levels at once; equivalent to chained [`child`](Self::child) calls.
    pub fn descend<I, S>(self: &Arc<Self>, items: I) -> ResultsResult<Arc<ResultNode>>
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        items
            .into_iter()
            .try_fold(Arc::clone(self), |node, item| node.child(item))
    }

    /// Open the file `name` directly beneath this node.
    pub fn file(&self, name: impl Into<PathSegment>) -> ResultsResult<ScopedStream> {
        let name = name.into();
        name.validate()?;
        let location = self.path.join(name.as_str());
        Ok(self.server.load_stream(&location)?)
    }

    /// Every known location beneath this node.
    ///
    /// A linear scan over all known locations, filtered by prefix.
    pub fn locations(&self) -> ResultsResult<Vec<Location>> {
        Ok(self
            .server
            .locations()?
            .into_iter()
            .filter(|loc| loc.is_beneath(self.path.as_str()))
            .collect())
    }

    /// Open any stored location through a validated stream.
    pub fn load_stream(&self, location: &Location) -> ResultsResult<ScopedStream> {
        Ok(self.server.load_stream(location)?)
    }

    /// Read any stored location into memory.
    pub fn load_bytes(&self, location: &Location) -> ResultsResult<Vec<u8>> {
        Ok(self.load_stream(location)?.read_to_vec()?)
    }
}

impl PartialEq for ResultNode {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.path == other.path
    }
}

impl Eq for ResultNode {}

impl fmt::Debug for ResultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.level.type_name(), self.path)
    }
}
