//! Content hashing for strings and files, with per-session memoization.
//!
//! [`ContentHasher`] is a process-scoped object owned by the build context.
//! File hashes are memoized by absolute path and trusted only while the
//! file's (modified time, length) signature is unchanged. A file rewritten
//! with the same length and a preserved timestamp will keep its stale hash
//! for the rest of the session; that risk is accepted in exchange for not
//! rehashing large unchanged inputs over and over.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use grist_common::ContentHash;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Byte encoding applied to text before hashing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8 without a byte order mark.
    #[default]
    Utf8,
    /// UTF-8 preceded by `EF BB BF`.
    Utf8Bom,
    /// UTF-16 little endian, no byte order mark.
    Utf16Le,
    /// UTF-16 big endian, no byte order mark.
    Utf16Be,
}

impl TextEncoding {
    /// Encodes `text` into bytes.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf8Bom => {
                let mut out = Vec::with_capacity(text.len() + 3);
                out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
                out.extend_from_slice(text.as_bytes());
                out
            }
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }
}

/// The cheap-to-read identity of a file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    /// Last write time. Platforms without modification times report the epoch.
    pub modified: SystemTime,
    /// File length in bytes.
    pub len: u64,
}

impl FileSignature {
    /// Reads the signature of the file at `path`.
    pub fn read(path: &Path) -> Result<Self, CacheError> {
        let meta = std::fs::metadata(path).map_err(CacheError::io(path))?;
        if !meta.is_file() {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a regular file"),
            });
        }
        Ok(Self {
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            len: meta.len(),
        })
    }
}

#[derive(Clone, Copy)]
struct FileHashEntry {
    signature: FileSignature,
    hash: ContentHash,
}

/// Memoization statistics for a [`ContentHasher`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HasherStats {
    /// Number of memoized file hashes.
    pub cached_files: usize,
    /// Number of memoized value hashes.
    pub cached_values: usize,
    /// Lookups answered from the tables.
    pub hits: u64,
    /// Lookups that had to hash.
    pub misses: u64,
}

/// Computes and memoizes content hashes.
///
/// Safe to share across worker threads. Concurrent misses on the same key may
/// hash the same content twice; both writers store an equivalent entry.
#[derive(Default)]
pub struct ContentHasher {
    files: RwLock<HashMap<PathBuf, FileHashEntry>>,
    values: RwLock<HashMap<String, ContentHash>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentHasher {
    /// Creates a hasher with empty memoization tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `text` after encoding it with `encoding`. Pure.
    pub fn compute_content_hash(text: &str, encoding: TextEncoding) -> ContentHash {
        match encoding {
            TextEncoding::Utf8 => ContentHash::from_bytes(text.as_bytes()),
            other => ContentHash::from_bytes(&other.encode(text)),
        }
    }

    /// Hashes the full contents of the file at `path`, without memoization.
    pub fn compute_file_hash(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(CacheError::io(path))?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Returns the hash of the file at `path`, reusing the memoized value while
    /// the file's signature is unchanged.
    pub fn file_hash(&self, path: &Path) -> Result<ContentHash, CacheError> {
        self.file_hash_with_signature(path).map(|(_, hash)| hash)
    }

    /// Like [`file_hash`](Self::file_hash), also returning the signature the
    /// hash was validated against.
    pub fn file_hash_with_signature(
        &self,
        path: &Path,
    ) -> Result<(FileSignature, ContentHash), CacheError> {
        let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let signature = FileSignature::read(&key)?;

        if let Some(entry) = self.files.read().get(&key) {
            if entry.signature == signature {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok((signature, entry.hash));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let hash = Self::compute_file_hash(&key)?;
        self.files
            .write()
            .insert(key, FileHashEntry { signature, hash });
        Ok((signature, hash))
    }

    /// Returns the hash of a string value, memoized by the value itself.
    pub fn value_hash(&self, value: &str) -> ContentHash {
        if let Some(hash) = self.values.read().get(value) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *hash;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let hash = Self::compute_content_hash(value, TextEncoding::Utf8);
        self.values.write().insert(value.to_string(), hash);
        hash
    }

    /// Hashes multiple files through the memo table.
    ///
    /// Fails on the first file that cannot be hashed.
    pub fn hash_files(
        &self,
        paths: &[PathBuf],
    ) -> Result<BTreeMap<PathBuf, ContentHash>, CacheError> {
        paths
            .iter()
            .map(|path| Ok((path.clone(), self.file_hash(path)?)))
            .collect()
    }

    /// Returns memoization statistics.
    pub fn stats(&self) -> HasherStats {
        HasherStats {
            cached_files: self.files.read().len(),
            cached_values: self.values.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drops all memoized hashes.
    pub fn clear(&self) {
        self.files.write().clear();
        self.values.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        let a = ContentHasher::compute_content_hash("body{}", TextEncoding::Utf8);
        let b = ContentHasher::compute_content_hash("body{}", TextEncoding::Utf8);
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_depends_on_encoding() {
        let utf8 = ContentHasher::compute_content_hash("abc", TextEncoding::Utf8);
        let bom = ContentHasher::compute_content_hash("abc", TextEncoding::Utf8Bom);
        let le = ContentHasher::compute_content_hash("abc", TextEncoding::Utf16Le);
        let be = ContentHasher::compute_content_hash("abc", TextEncoding::Utf16Be);
        assert_ne!(utf8, bom);
        assert_ne!(utf8, le);
        assert_ne!(le, be);
    }

    #[test]
    fn utf16_encoding_bytes() {
        assert_eq!(TextEncoding::Utf16Le.encode("A"), vec![0x41, 0x00]);
        assert_eq!(TextEncoding::Utf16Be.encode("A"), vec![0x00, 0x41]);
        assert_eq!(TextEncoding::Utf8Bom.encode("A"), vec![0xEF, 0xBB, 0xBF, 0x41]);
    }

    #[test]
    fn file_hash_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.css");
        std::fs::write(&path, "a{color:red}").unwrap();

        let file = ContentHasher::compute_file_hash(&path).unwrap();
        let text = ContentHasher::compute_content_hash("a{color:red}", TextEncoding::Utf8);
        assert_eq!(file, text);
    }

    #[test]
    fn file_hash_nonexistent_errors() {
        let hasher = ContentHasher::new();
        let err = hasher.file_hash(Path::new("/nonexistent/file.css")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn file_hash_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "var a = 1;").unwrap();

        let hasher = ContentHasher::new();
        let h1 = hasher.file_hash(&path).unwrap();
        let h2 = hasher.file_hash(&path).unwrap();
        assert_eq!(h1, h2);

        let stats = hasher.stats();
        assert_eq!(stats.cached_files, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn file_hash_recomputed_when_length_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "var a = 1;").unwrap();

        let hasher = ContentHasher::new();
        let before = hasher.file_hash(&path).unwrap();
        std::fs::write(&path, "var a = 1; var b = 2;").unwrap();
        let after = hasher.file_hash(&path).unwrap();

        assert_ne!(before, after);
        assert_eq!(hasher.stats().misses, 2);
    }

    #[test]
    fn value_hash_is_memoized() {
        let hasher = ContentHasher::new();
        let a = hasher.value_hash("theme1");
        let b = hasher.value_hash("theme1");
        assert_eq!(a, b);
        assert_eq!(
            a,
            ContentHasher::compute_content_hash("theme1", TextEncoding::Utf8)
        );
        assert_eq!(hasher.stats().cached_values, 1);
        assert_eq!(hasher.stats().hits, 1);
    }

    #[test]
    fn hash_files_fails_on_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.css");
        std::fs::write(&a, "a{}").unwrap();
        let missing = dir.path().join("missing.css");

        let hasher = ContentHasher::new();
        let hashes = hasher.hash_files(std::slice::from_ref(&a)).unwrap();
        assert_eq!(hashes[&a], ContentHasher::compute_file_hash(&a).unwrap());

        let err = hasher.hash_files(&[a, missing]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn clear_empties_tables() {
        let hasher = ContentHasher::new();
        hasher.value_hash("x");
        hasher.clear();
        assert_eq!(hasher.stats().cached_values, 0);
    }

    #[test]
    fn directory_is_not_hashable() {
        let dir = tempfile::tempdir().unwrap();
        let hasher = ContentHasher::new();
        assert!(hasher.file_hash(dir.path()).is_err());
    }
}
