//! # Ember Configuration
//!
//! Typed configuration for the ember event dispatcher.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_config::EmberConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EmberConfig::load_from_file("ember.toml")?;
//!     println!("pool retention: {}", config.pool.max_free_per_kind);
//!     Ok(())
//! }
//! ```
//!
//! Every field has a default, so an empty file (or no file at all) is valid.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;
mod config;
mod error;

pub use components::{DispatcherConfig, PoolConfig};
pub use config::EmberConfig;
pub use error::{ConfigError, ConfigResult};
