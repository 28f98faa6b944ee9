//! Content hashing for simvault.
//!
//! Provides domain-separated BLAKE3 hashing for the three places simvault
//! derives identity from content: digests of stored bytes, tokens of
//! tokenizable objects, and tokens for non-string path segments.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
