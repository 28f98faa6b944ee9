//! Hierarchical result addressing and deduplicated object-graph storage.
//!
//! Two things live here:
//!
//! - **Object graphs.** Domain objects implement [`Tokenizable`]: a stable
//!   `<ClassName>-<token>` key plus a *shallow* representation in which
//!   nested tokenizable objects appear only as key references. Storing a
//!   graph writes one JSON record per distinct key, skipping keys that are
//!   already stored. Loading resolves references depth-first and shares one
//!   in-memory instance per key through a [`DecodeCache`].
//! - **Result tree.** [`ResultClient`] is the root of a
//!   transformation → clone → extension → file tree of [`ResultNode`]s.
//!   Nodes derive children lazily and memoize them; each node's location is
//!   its parent's location plus one segment.
//!
//! # Ordering
//!
//! Dependencies are written before the records that reference them, and
//! reconstructed before the objects that reference them.

pub mod cache;
pub mod client;
pub mod encode;
pub mod error;
pub mod graph;
pub mod node;
pub mod tokenizable;

pub use cache::DecodeCache;
pub use client::{ResultClient, ROOT_PATH, SETUP_PREFIX};
pub use encode::{flatten, key_of, EncodedRecord};
pub use error::{ResultsError, ResultsResult};
pub use graph::{store_graph, GraphLoader, StoreReport};
pub use node::{object_segment, value_segment, Entry, NodeLevel, ResultNode};
pub use tokenizable::{
    downcast, FieldReader, ShallowFields, ShallowValue, Tokenizable, TokenizableClass,
    TokenizableRegistry, CLASS_FIELD, KEY_MARKER,
};
