use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Storage behaviour shared by every facade built from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Downgrade a digest mismatch on read from an error to a logged warning.
    ///
    /// Only for backends known to rewrite content asynchronously
    /// (eventually-consistent object stores and the like).
    pub allow_changed: bool,
}

impl StorageConfig {
    /// Strict validation: any digest mismatch fails the read.
    pub const fn strict() -> Self {
        Self {
            allow_changed: false,
        }
    }

    /// Permissive validation: digest mismatches only warn.
    pub const fn allow_changed() -> Self {
        Self {
            allow_changed: true,
        }
    }

    /// Parse from a TOML document such as `allow_changed = true`.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }
}
