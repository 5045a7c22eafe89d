//! Persisted record of a saved section.
//!
//! One manifest is written per fingerprint. It lists every result the section
//! produced (grouped by category, in the order they were added), the source
//! dependencies discovered while the work ran, and enough metadata to decide
//! whether the record is still usable.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use grist_common::{ContentHash, PivotSet, SectionId};
use serde::{Deserialize, Serialize};

use crate::dependency::SourceDependency;
use crate::error::CacheError;

/// One result recorded by a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    /// Relative output path of the item.
    pub relative_path: String,

    /// Pivots the item was produced for.
    #[serde(default, skip_serializing_if = "PivotSet::is_empty")]
    pub pivots: PivotSet,

    /// Content hash of the item's bytes.
    pub hash: ContentHash,

    /// Extension of the stored blob, including the dot (may be empty).
    #[serde(default)]
    pub extension: String,

    /// Whether the item is a final output of the build.
    pub is_end_result: bool,
}

impl CachedResult {
    /// File name of the blob holding this result's bytes.
    pub fn blob_name(&self) -> String {
        blob_name(&self.hash, &self.extension)
    }
}

/// File name of a content blob: the hex hash followed by the extension.
pub fn blob_name(hash: &ContentHash, extension: &str) -> String {
    format!("{hash}{extension}")
}

/// The persisted state of one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionManifest {
    /// Version of the tool that saved the section.
    pub tool_version: String,

    /// Identifier of the section.
    pub id: SectionId,

    /// Fingerprint the section was saved under.
    pub fingerprint: ContentHash,

    /// Seconds since the Unix epoch when the section was saved.
    pub created_unix: u64,

    /// Files and directories discovered while the work ran.
    #[serde(default)]
    pub dependencies: Vec<SourceDependency>,

    /// Results per category, each in insertion order.
    #[serde(default)]
    pub results: BTreeMap<String, Vec<CachedResult>>,
}

impl SectionManifest {
    /// Creates an empty manifest stamped with the current time.
    pub fn new(id: SectionId, fingerprint: ContentHash, tool_version: &str) -> Self {
        let created_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            tool_version: tool_version.to_string(),
            id,
            fingerprint,
            created_unix,
            dependencies: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    /// Iterates over every result in every category.
    pub fn all_results(&self) -> impl Iterator<Item = &CachedResult> {
        self.results.values().flatten()
    }

    /// Iterates over results flagged as end results.
    pub fn end_results(&self) -> impl Iterator<Item = &CachedResult> {
        self.all_results().filter(|r| r.is_end_result)
    }

    /// Returns the results of one category.
    pub fn category(&self, category: &str) -> &[CachedResult] {
        self.results.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if this manifest was produced by a compatible tool version.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.tool_version == current_version
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Parses from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::ManifestParse {
            reason: e.to_string(),
        })
    }
}
