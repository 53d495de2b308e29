//! Per-component configuration sections

mod dispatcher;
mod pool;

pub use dispatcher::DispatcherConfig;
pub use pool::PoolConfig;
