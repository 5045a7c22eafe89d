//! Parsing and validation of `grist.toml` build configuration files.
//!
//! This crate reads the build configuration and produces a strongly-typed
//! [`BuildConfig`], plus the resolved directory layout a build runs against.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_paths, ResolvedPaths};
pub use types::*;
