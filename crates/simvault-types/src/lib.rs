//! Foundation types for simvault.
//!
//! This crate provides the addressing and identity types shared by every
//! other simvault crate.
//!
//! # Key Types
//!
//! - [`Location`]: opaque `/`-delimited key addressing one stored record
//! - [`Digest`]: fixed-width content hash of stored bytes
//! - [`Metadata`]: the digest recorded when data was written
//! - [`TokenKey`]: `<ClassName>-<token>` identity of a tokenizable object
//! - [`PathSegment`]: one component of a hierarchical location

pub mod digest;
pub mod error;
pub mod key;
pub mod location;
pub mod metadata;
pub mod segment;

pub use digest::Digest;
pub use error::TypeError;
pub use key::TokenKey;
pub use location::Location;
pub use metadata::Metadata;
pub use segment::PathSegment;
