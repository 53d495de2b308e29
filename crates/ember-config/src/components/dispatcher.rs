//! Dispatcher configuration

use serde::{Deserialize, Serialize};

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Queue length above which a warning is logged when the queue grows past it.
    pub queue_warn_threshold: usize,

    /// Emit a trace record for every strategy decision.
    pub trace_dispatch: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_warn_threshold: 1024,
            trace_dispatch: false,
        }
    }
}
