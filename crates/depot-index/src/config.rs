//! Index configuration (the `[index]` section of `depot.toml`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// When off, every lookup scans and authoritative flags are ignored.
    pub enabled: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig { enabled: true }
    }
}
