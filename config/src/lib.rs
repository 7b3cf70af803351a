//! Configuration types and loading for the incremental sync engine.
//!
//! The [`shared`] module holds the configuration structures consumed by the `etl` engine and the
//! `syncer` binary, while [`load_config`] assembles them from configuration files and
//! environment variable overrides.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
