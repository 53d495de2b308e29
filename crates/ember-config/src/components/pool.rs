//! Event pool configuration

use serde::{Deserialize, Serialize};

/// Event pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Released events kept for reuse, per event kind.
    ///
    /// Events released beyond this count are dropped instead of pooled.
    /// `0` disables retention entirely.
    pub max_free_per_kind: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_free_per_kind: 64,
        }
    }
}
