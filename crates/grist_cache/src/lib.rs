//! Content-addressed incremental build cache.
//!
//! Work is organized into sections. Each section is fingerprinted from its
//! identifier and the content and settings it varies by; a saved section
//! records its results as content-addressed blobs plus the files it read along
//! the way. On the next run a section with the same fingerprint is skipped
//! when its outputs are still in place, or restored from the store when they
//! are not, as long as none of its recorded dependencies changed.

#![warn(missing_docs)]

pub mod content_item;
pub mod dependency;
pub mod error;
pub mod hasher;
pub mod lock;
pub mod log;
pub mod manager;
pub mod manifest;
pub mod measure;
pub mod section;
pub mod store;
pub mod vary_by;

pub use content_item::{ContentItem, ContentSource};
pub use dependency::SourceDependency;
pub use error::CacheError;
pub use hasher::{ContentHasher, FileSignature, HasherStats, TextEncoding};
pub use log::{hashed_output_path, OutputLog, OutputRecord};
pub use manager::{
    CacheManager, CacheSettings, CacheStats, FileCacheManager, NullCacheManager, PrunePolicy,
    PruneReport,
};
pub use manifest::{CachedResult, SectionManifest};
pub use measure::{MeasureResult, NullMeasure, RecordingMeasure, TimeMeasure};
pub use section::{CacheSection, SectionState};
pub use vary_by::VaryBy;
