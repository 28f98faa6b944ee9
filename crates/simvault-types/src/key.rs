use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::location::Location;

/// Suffix of every serialized record's storage key.
pub const RECORD_EXTENSION: &str = ".json";

/// Stable identity of a tokenizable object: `<ClassName>-<token>`.
///
/// The class name is ASCII alphanumeric plus `_`; the token is lowercase
/// hex derived from the object's content. Two objects with equal keys are
/// treated as the same object.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey {
    raw: String,
    split: usize,
}

impl TokenKey {
    /// Build a key from a class name and a token.
    pub fn new(class_name: &str, token: &str) -> Result<Self, TypeError> {
        Self::parse(&format!("{class_name}-{token}"))
    }

    /// Parse a `<ClassName>-<token>` string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidKey {
            key: s.to_string(),
            reason: reason.to_string(),
        };

        let split = s.find('-').ok_or_else(|| invalid("missing '-' separator"))?;
        let (class, token) = (&s[..split], &s[split + 1..]);

        if class.is_empty() {
            return Err(invalid("empty class name"));
        }
        if !class.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("class name must be ASCII alphanumeric or '_'"));
        }
        if token.is_empty() {
            return Err(invalid("empty token"));
        }
        if !token.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(invalid("token must be lowercase hex"));
        }

        Ok(Self {
            raw: s.to_string(),
            split,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.raw[..self.split]
    }

    pub fn token(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Storage key for this object's record: `<prefix>/<ClassName>/<token>.json`.
    pub fn storage_location(&self, prefix: &str) -> Location {
        let file = format!("{}{RECORD_EXTENSION}", self.token());
        Location::from_segments(prefix.split('/').chain([self.class_name(), file.as_str()]))
    }

    /// Recover a key from a record's storage key, given the prefix it was
    /// stored under.
    pub fn from_storage_location(prefix: &str, location: &Location) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidStorageKey {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        let rest = location
            .as_str()
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| invalid("not beneath prefix"))?;
        let (class, file) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing class segment"))?;
        let token = file
            .strip_suffix(RECORD_EXTENSION)
            .ok_or_else(|| invalid("missing .json suffix"))?;
        Self::new(class, token)
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TokenKey('{}')>", self.raw)
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TokenKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TokenKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for TokenKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
