//! Source dependencies discovered while a section runs.
//!
//! A section's fingerprint covers the inputs known before the work starts.
//! Files reached during the work (includes, imports, wildcard directories)
//! are recorded as dependencies and re-verified before cached results are
//! restored.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use grist_common::{ContentHash, HashBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::CacheError;
use crate::hasher::{ContentHasher, FileSignature};

const LISTING_DOMAIN: &str = "grist-dir-listing-v1";

/// A file or directory whose state a cached section depends on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDependency {
    /// A single file.
    File {
        /// Path of the file.
        path: PathBuf,
        /// Signature observed when the dependency was recorded.
        signature: FileSignature,
        /// Content hash observed when the dependency was recorded.
        hash: ContentHash,
    },
    /// The set of files in a directory matching a pattern.
    Directory {
        /// Directory root.
        path: PathBuf,
        /// Glob matched against paths relative to the root.
        pattern: String,
        /// Whether subdirectories are included.
        recursive: bool,
        /// Subdirectories left out of the listing.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        excluded: Vec<PathBuf>,
        /// Hash over the sorted relative paths and content hashes of every
        /// matching file.
        listing_hash: ContentHash,
    },
}

impl SourceDependency {
    /// Records the current state of a file.
    pub fn file(path: &Path, hasher: &ContentHasher) -> Result<Self, CacheError> {
        let (signature, hash) = hasher.file_hash_with_signature(path)?;
        Ok(Self::File {
            path: path.to_path_buf(),
            signature,
            hash,
        })
    }

    /// Records the current listing of a directory.
    ///
    /// A missing directory records an empty listing, so creating it with
    /// matching files later invalidates the dependency. Files below any of
    /// `excluded` are not listed; only exclusions inside `dir` are kept.
    pub fn directory(
        dir: &Path,
        pattern: &str,
        recursive: bool,
        excluded: &[PathBuf],
        hasher: &ContentHasher,
    ) -> Result<Self, CacheError> {
        let excluded: Vec<PathBuf> = excluded
            .iter()
            .filter(|x| x.starts_with(dir))
            .cloned()
            .collect();
        let listing_hash = listing_hash(dir, pattern, recursive, &excluded, hasher)?;
        Ok(Self::Directory {
            path: dir.to_path_buf(),
            pattern: pattern.to_string(),
            recursive,
            excluded,
            listing_hash,
        })
    }

    /// The file or directory path.
    pub fn path(&self) -> &Path {
        match self {
            SourceDependency::File { path, .. } | SourceDependency::Directory { path, .. } => path,
        }
    }

    /// Returns `true` if the dependency is unchanged since it was recorded.
    ///
    /// The content hash is authoritative. A file whose signature still matches
    /// is trusted without reading it; otherwise it is rehashed and compared,
    /// so a touched but unmodified file stays current. Any failure to read
    /// counts as changed.
    pub fn is_current(&self, hasher: &ContentHasher) -> bool {
        match self {
            SourceDependency::File {
                path,
                signature,
                hash,
            } => match FileSignature::read(path) {
                Ok(current) if current == *signature => true,
                Ok(_) => hasher.file_hash(path).is_ok_and(|h| h == *hash),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "dependency unreadable");
                    false
                }
            },
            SourceDependency::Directory {
                path,
                pattern,
                recursive,
                excluded,
                listing_hash: recorded,
            } => match listing_hash(path, pattern, *recursive, excluded, hasher) {
                Ok(current) => current == *recorded,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "directory dependency unreadable");
                    false
                }
            },
        }
    }
}

/// Compiles a glob pattern for matching relative paths.
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher, CacheError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Lists files under `dir` whose path relative to `dir` matches `pattern`,
/// sorted by relative path. Relative paths use `/` separators. Directories
/// in `excluded` are not descended into.
pub fn list_matching_files(
    dir: &Path,
    pattern: &str,
    recursive: bool,
    excluded: &[PathBuf],
) -> Result<Vec<(String, PathBuf)>, CacheError> {
    let matcher = compile_pattern(pattern)?;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(dir).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    let entries = walker
        .into_iter()
        .filter_entry(|e| !excluded.iter().any(|x| e.path().starts_with(x)))
        .filter_map(|e| e.ok());
    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        let name_matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| matcher.is_match(name));
        if matcher.is_match(&rel) || name_matches {
            files.push((rel, entry.path().to_path_buf()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn listing_hash(
    dir: &Path,
    pattern: &str,
    recursive: bool,
    excluded: &[PathBuf],
    hasher: &ContentHasher,
) -> Result<ContentHash, CacheError> {
    let files = list_matching_files(dir, pattern, recursive, excluded)?;
    let mut builder = HashBuilder::new(LISTING_DOMAIN);
    builder.field(&(files.len() as u64).to_le_bytes());
    for (rel, path) in &files {
        let hash = hasher.file_hash(path)?;
        builder.str_field(rel).hash_field(&hash);
    }
    Ok(builder.finish())
}
