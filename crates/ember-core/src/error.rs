//! Error types for the dispatch core
//!
//! Only recoverable conditions are errors. Contract violations such as
//! recursive dispatch or gate underflow panic instead.

use thiserror::Error;

use crate::pool::EventHandle;

/// Event pool error type
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The handle does not name a slot of this pool
    #[error("Invalid event handle {0}")]
    InvalidHandle(EventHandle),

    /// The handle's event was already returned to the pool
    #[error("Stale event handle {0}: the event was already released")]
    StaleHandle(EventHandle),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors from installing the thread's current dispatcher
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallError {
    /// A dispatcher is already installed on this thread
    #[error("A dispatcher is already installed on this thread")]
    AlreadyInstalled,
}
