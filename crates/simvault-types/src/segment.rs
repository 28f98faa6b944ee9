use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;
use crate::location::SEPARATOR;

/// One normalized component of a hierarchical location.
///
/// Strings pass through unchanged and integers render in decimal. Anything
/// else must be reduced to a content-derived digest first (see
/// [`PathSegment::from_digest`]); process-local identity hashes are never
/// acceptable because they differ between runs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathSegment(String);

impl PathSegment {
    /// A segment holding the hex form of a content digest.
    pub fn from_digest(digest: &Digest) -> Self {
        Self(digest.to_hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the segment names exactly one level below its parent.
    pub fn validate(&self) -> Result<(), TypeError> {
        let reason = match self.0.as_str() {
            "" => "empty",
            "." | ".." => "relative components are not allowed",
            s if s.contains(SEPARATOR) => "contains a separator",
            _ => return Ok(()),
        };
        Err(TypeError::InvalidSegment {
            segment: self.0.clone(),
            reason,
        })
    }
}

impl fmt::Debug for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathSegment({:?})", self.0)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for PathSegment {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

macro_rules! segment_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for PathSegment {
                fn from(n: $t) -> Self {
                    Self(n.to_string())
                }
            }
        )*
    };
}

segment_from_int!(u8, u16, u32, u64, usize, i32, i64);

impl AsRef<str> for PathSegment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
