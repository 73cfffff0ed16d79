//! Parsing and validation of `brisk.toml` build configuration.
//!
//! This crate reads the configuration file and produces strongly-typed
//! [`ResolvedSettings`] with command-line overrides applied and all numeric
//! settings validated.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use resolve::{default_threads, resolve_settings, ResolvedCache, ResolvedSettings, SettingsOverrides};
pub use types::*;
