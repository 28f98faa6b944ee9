use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between location segments.
pub const SEPARATOR: char = '/';

/// Opaque key identifying one physical record in a storage backend.
///
/// Backends treat a location as an uninterpreted string. The hierarchical
/// result layer builds locations by joining path segments with `/`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Build a location from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<String> = segments
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        Self(parts.join("/"))
    }

    /// Append one segment, returning the child location.
    pub fn join(&self, segment: &str) -> Self {
        Self(format!("{}{SEPARATOR}{segment}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// The final segment (the "file name").
    pub fn name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Returns `true` if this location lies strictly beneath `prefix`.
    ///
    /// Matching is segment-aware: `a/bc` is not beneath `a/b`.
    pub fn is_beneath(&self, prefix: &str) -> bool {
        self.0
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(SEPARATOR) && rest.len() > 1)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({:?})", self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Location> for Location {
    fn from(l: &Location) -> Self {
        l.clone()
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Location {
    fn borrow(&self) -> &str {
        &self.0
    }
}
