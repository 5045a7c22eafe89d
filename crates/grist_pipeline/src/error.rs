//! Error types for the build pipeline.

use std::path::PathBuf;

use grist_cache::CacheError;
use grist_config::ConfigError;

/// Errors that abort a build.
///
/// Problems that only affect one file set, such as a missing input or an
/// unresolved token, are reported as issues in the build report instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error occurred outside the cache.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
