//! On-disk layout of the cache root.
//!
//! ```text
//! <root>/sections/<fp[0..2]>/<fp>.section   header + JSON manifest
//! <root>/content/<h[0..2]>/<h><ext>          raw content blobs
//! <root>/locks/<fp>.lock                     advisory lock files
//! <root>/tmp/                                partial writes
//! ```
//!
//! Every write lands in `tmp/` first and is renamed into place, so readers
//! never observe a half-written file. Section files carry a binary header with
//! magic bytes, the format version, the writing tool's version and an xxh3
//! checksum of the payload; any mismatch reads as a miss.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use grist_common::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::content_item::{ContentItem, ContentSource};
use crate::error::CacheError;
use crate::manifest::{blob_name, SectionManifest};

/// Magic bytes identifying a grist section file.
const SECTION_MAGIC: [u8; 4] = *b"GRST";

/// Current section file format version. Increment on breaking changes to the
/// header or payload format.
pub const SECTION_FORMAT_VERSION: u32 = 1;

const SECTIONS_DIR: &str = "sections";
const CONTENT_DIR: &str = "content";
const LOCKS_DIR: &str = "locks";
const TMP_DIR: &str = "tmp";
const SECTION_EXT: &str = "section";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Header prepended to every section file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionHeader {
    magic: [u8; 4],
    format_version: u32,
    tool_version: String,
    checksum: u128,
}

/// A section file found while scanning the store.
#[derive(Debug, Clone)]
pub struct StoredSection {
    /// Fingerprint parsed from the file name.
    pub fingerprint: ContentHash,
    /// Path of the section file.
    pub path: PathBuf,
    /// Size on disk in bytes.
    pub size: u64,
}

/// A content blob found while scanning the store.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Blob file name (`<hash><ext>`).
    pub name: String,
    /// Path of the blob.
    pub path: PathBuf,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Reads and writes the files under a cache root.
#[derive(Debug, Clone)]
pub struct SectionStore {
    root: PathBuf,
    tool_version: String,
}

impl SectionStore {
    /// Creates a store rooted at `root`. Nothing is created on disk until the
    /// first write.
    pub fn new(root: &Path, tool_version: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            tool_version: tool_version.to_string(),
        }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the section file for a fingerprint.
    pub fn section_path(&self, fingerprint: &ContentHash) -> PathBuf {
        self.root
            .join(SECTIONS_DIR)
            .join(fingerprint.shard())
            .join(format!("{fingerprint}.{SECTION_EXT}"))
    }

    /// Path of the blob holding content with the given hash and extension.
    pub fn blob_path(&self, hash: &ContentHash, extension: &str) -> PathBuf {
        self.root
            .join(CONTENT_DIR)
            .join(hash.shard())
            .join(blob_name(hash, extension))
    }

    /// Path of the lock file for a fingerprint.
    pub fn lock_path(&self, fingerprint: &ContentHash) -> PathBuf {
        self.root
            .join(LOCKS_DIR)
            .join(format!("{fingerprint}.lock"))
    }

    /// Creates the top-level directories.
    pub fn ensure_layout(&self) -> Result<(), CacheError> {
        for sub in [SECTIONS_DIR, CONTENT_DIR, LOCKS_DIR, TMP_DIR] {
            let dir = self.root.join(sub);
            std::fs::create_dir_all(&dir).map_err(CacheError::io(&dir))?;
        }
        Ok(())
    }

    /// Encodes a manifest as a section file: a 4-byte little-endian header
    /// length, the bincode header, then the JSON payload.
    pub fn encode_section(&self, manifest: &SectionManifest) -> Result<Vec<u8>, CacheError> {
        let payload = manifest.to_json()?;
        let header = SectionHeader {
            magic: SECTION_MAGIC,
            format_version: SECTION_FORMAT_VERSION,
            tool_version: self.tool_version.clone(),
            checksum: xxhash_rust::xxh3::xxh3_128(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Decodes and validates a section file.
    pub fn decode_section(&self, path: &Path, raw: &[u8]) -> Result<SectionManifest, CacheError> {
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let len_bytes: [u8; 4] = raw
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| invalid("file too short"))?;
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        let header_bytes = raw
            .get(4..4 + header_len)
            .ok_or_else(|| invalid("truncated header"))?;

        let (header, _): (SectionHeader, usize) =
            bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != SECTION_MAGIC {
            return Err(invalid("missing magic bytes"));
        }
        if header.format_version != SECTION_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: SECTION_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        if header.tool_version != self.tool_version {
            return Err(invalid("written by a different tool version"));
        }

        let payload = &raw[4 + header_len..];
        let actual = xxhash_rust::xxh3::xxh3_128(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: format!("{:032x}", header.checksum),
                actual: format!("{actual:032x}"),
            });
        }

        SectionManifest::from_json(payload)
    }

    /// Writes a section file atomically.
    pub fn write_section(&self, manifest: &SectionManifest) -> Result<PathBuf, CacheError> {
        let bytes = self.encode_section(manifest)?;
        let path = self.section_path(&manifest.fingerprint);
        self.write_atomic(&path, |tmp| {
            std::fs::write(tmp, &bytes).map_err(CacheError::io(tmp))
        })?;
        Ok(path)
    }

    /// Reads the section saved under `fingerprint`.
    ///
    /// Returns `None` if the file doesn't exist or fails validation. This is
    /// fail-safe: corruption results in a cache miss.
    pub fn read_section(&self, fingerprint: &ContentHash) -> Option<SectionManifest> {
        let path = self.section_path(fingerprint);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "section unreadable, treating as miss");
                }
                return None;
            }
        };
        match self.decode_section(&path, &raw) {
            Ok(manifest) if manifest.fingerprint == *fingerprint => Some(manifest),
            Ok(_) => {
                debug!(path = %path.display(), "section fingerprint does not match file name");
                None
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "invalid section, treating as miss");
                None
            }
        }
    }

    /// Deletes the section file for a fingerprint. Missing files are ignored.
    pub fn remove_section(&self, fingerprint: &ContentHash) -> Result<bool, CacheError> {
        remove_if_exists(&self.section_path(fingerprint))
    }

    /// Deletes the lock file for a fingerprint. Missing files are ignored.
    pub fn remove_lock(&self, fingerprint: &ContentHash) -> Result<bool, CacheError> {
        remove_if_exists(&self.lock_path(fingerprint))
    }

    /// Fingerprints that have a lock file.
    pub fn list_locks(&self) -> Vec<ContentHash> {
        scan(&self.root.join(LOCKS_DIR))
            .into_iter()
            .filter_map(|(path, _)| {
                if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                    return None;
                }
                path.file_stem()?.to_str()?.parse().ok()
            })
            .collect()
    }

    /// Returns `true` if a blob for the given hash and extension exists.
    pub fn has_blob(&self, hash: &ContentHash, extension: &str) -> bool {
        self.blob_path(hash, extension).is_file()
    }

    /// Stores the bytes of `item` under `hash`. Existing blobs are kept, since
    /// equal hashes mean equal bytes.
    pub fn put_blob(
        &self,
        item: &ContentItem,
        hash: &ContentHash,
        extension: &str,
    ) -> Result<PathBuf, CacheError> {
        let path = self.blob_path(hash, extension);
        if path.is_file() {
            return Ok(path);
        }
        self.write_atomic(&path, |tmp| match item.source() {
            ContentSource::File(src) => std::fs::copy(src, tmp)
                .map(|_| ())
                .map_err(CacheError::io(src)),
            ContentSource::Memory(bytes) | ContentSource::MemoryAndFile { bytes, .. } => {
                std::fs::write(tmp, bytes).map_err(CacheError::io(tmp))
            }
        })?;
        Ok(path)
    }

    /// Lists all section files.
    pub fn list_sections(&self) -> Vec<StoredSection> {
        scan(&self.root.join(SECTIONS_DIR))
            .into_iter()
            .filter_map(|(path, size)| {
                if path.extension().and_then(|e| e.to_str()) != Some(SECTION_EXT) {
                    return None;
                }
                let fingerprint = path.file_stem()?.to_str()?.parse().ok()?;
                Some(StoredSection {
                    fingerprint,
                    path,
                    size,
                })
            })
            .collect()
    }

    /// Lists all content blobs.
    pub fn list_blobs(&self) -> Vec<StoredBlob> {
        scan(&self.root.join(CONTENT_DIR))
            .into_iter()
            .filter_map(|(path, size)| {
                let name = path.file_name()?.to_str()?.to_string();
                Some(StoredBlob { name, path, size })
            })
            .collect()
    }

    /// Removes blobs whose name is not in `live`. Returns the number removed.
    pub fn gc_blobs(&self, live: &HashSet<String>) -> Result<usize, CacheError> {
        let mut removed = 0;
        for blob in self.list_blobs() {
            if !live.contains(&blob.name) && remove_if_exists(&blob.path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deletes and recreates the cache root.
    pub fn clean(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(CacheError::io(&self.root))?;
        }
        self.ensure_layout()
    }

    fn write_atomic(
        &self,
        target: &Path,
        write: impl FnOnce(&Path) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        let tmp_dir = self.root.join(TMP_DIR);
        std::fs::create_dir_all(&tmp_dir).map_err(CacheError::io(&tmp_dir))?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
        }

        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("write");
        let tmp = tmp_dir.join(format!(
            "{name}.{}.{}.partial",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write(&tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&tmp, target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(CacheError::Io {
                path: target.to_path_buf(),
                source: e,
            });
        }
        Ok(())
    }
}

fn scan(dir: &Path) -> Vec<(PathBuf, u64)> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            (e.into_path(), size)
        })
        .collect()
}

fn remove_if_exists(path: &Path) -> Result<bool, CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CachedResult;
    use grist_common::{PivotSet, SectionId};

    fn make_store() -> (tempfile::TempDir, SectionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(&dir.path().join("cache"), "0.1.0");
        (dir, store)
    }

    fn manifest(fp: &[u8]) -> SectionManifest {
        let mut m = SectionManifest::new(
            SectionId::new(["Everything", "Css"]),
            ContentHash::from_bytes(fp),
            "0.1.0",
        );
        m.results.insert(
            "assembled".into(),
            vec![CachedResult {
                relative_path: "site.css".into(),
                pivots: PivotSet::new(),
                hash: ContentHash::from_bytes(b"a{}"),
                extension: ".css".into(),
                is_end_result: true,
            }],
        );
        m
    }

    #[test]
    fn section_write_and_read() {
        let (_dir, store) = make_store();
        let m = manifest(b"fp1");
        let path = store.write_section(&m).unwrap();
        assert!(path.starts_with(store.root().join("sections")));
        assert_eq!(
            path.parent().unwrap().file_name().unwrap(),
            m.fingerprint.shard().as_str()
        );

        let back = store.read_section(&m.fingerprint).unwrap();
        assert_eq!(back.id, m.id);
        assert_eq!(back.category("assembled").len(), 1);
    }

    #[test]
    fn read_missing_returns_none() {
        let (_dir, store) = make_store();
        assert!(store.read_section(&ContentHash::from_bytes(b"nope")).is_none());
    }

    #[test]
    fn read_garbage_returns_none() {
        let (_dir, store) = make_store();
        let fp = ContentHash::from_bytes(b"garbage");
        let path = store.section_path(&fp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"garbage data").unwrap();
        assert!(store.read_section(&fp).is_none());
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let (_dir, store) = make_store();
        let m = manifest(b"fp2");
        let path = store.write_section(&m).unwrap();

        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 2;
        raw[last] ^= 0x01;
        let err = store.decode_section(&path, &raw).unwrap_err();
        assert!(matches!(err, CacheError::ChecksumMismatch { .. }));

        std::fs::write(&path, &raw).unwrap();
        assert!(store.read_section(&m.fingerprint).is_none());
    }

    #[test]
    fn wrong_magic_is_invalid_header() {
        let (_dir, store) = make_store();
        let header = SectionHeader {
            magic: *b"BAAD",
            format_version: SECTION_FORMAT_VERSION,
            tool_version: "0.1.0".into(),
            checksum: 0,
        };
        let header_bytes =
            bincode::serde::encode_to_vec(&header, bincode::config::standard()).unwrap();
        let mut raw = (header_bytes.len() as u32).to_le_bytes().to_vec();
        raw.extend_from_slice(&header_bytes);
        let err = store.decode_section(Path::new("x.section"), &raw).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn other_format_version_is_rejected() {
        let (_dir, store) = make_store();
        let payload = manifest(b"fp").to_json().unwrap();
        let header = SectionHeader {
            magic: SECTION_MAGIC,
            format_version: SECTION_FORMAT_VERSION + 1,
            tool_version: "0.1.0".into(),
            checksum: xxhash_rust::xxh3::xxh3_128(&payload),
        };
        let header_bytes =
            bincode::serde::encode_to_vec(&header, bincode::config::standard()).unwrap();
        let mut raw = (header_bytes.len() as u32).to_le_bytes().to_vec();
        raw.extend_from_slice(&header_bytes);
        raw.extend_from_slice(&payload);
        let err = store.decode_section(Path::new("x.section"), &raw).unwrap_err();
        assert!(matches!(err, CacheError::VersionMismatch { .. }));
    }

    #[test]
    fn other_tool_version_is_a_miss() {
        let (dir, store) = make_store();
        let m = manifest(b"fp3");
        store.write_section(&m).unwrap();

        let newer = SectionStore::new(&dir.path().join("cache"), "0.2.0");
        assert!(newer.read_section(&m.fingerprint).is_none());
    }

    #[test]
    fn misplaced_section_is_a_miss() {
        let (_dir, store) = make_store();
        let m = manifest(b"real");
        let bytes = store.encode_section(&m).unwrap();
        let other = ContentHash::from_bytes(b"other");
        let path = store.section_path(&other);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        assert!(store.read_section(&other).is_none());
    }

    #[test]
    fn blobs_are_content_addressed() {
        let (_dir, store) = make_store();
        let item = ContentItem::from_text("site.css", "a{}");
        let hash = ContentHash::from_bytes(b"a{}");
        let path = store.put_blob(&item, &hash, ".css").unwrap();
        assert!(path.ends_with(format!("content/{}/{hash}.css", hash.shard())));
        assert!(store.has_blob(&hash, ".css"));
        assert_eq!(std::fs::read(&path).unwrap(), b"a{}");

        // A second put is a no-op.
        store.put_blob(&item, &hash, ".css").unwrap();
        assert_eq!(store.list_blobs().len(), 1);
    }

    #[test]
    fn file_backed_blob_is_copied() {
        let (dir, store) = make_store();
        let src = dir.path().join("logo.png");
        std::fs::write(&src, [9u8, 8, 7]).unwrap();
        let item = ContentItem::from_file("logo.png", &src);
        let hash = ContentHash::from_bytes(&[9, 8, 7]);
        let path = store.put_blob(&item, &hash, ".png").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn no_partial_files_left_behind() {
        let (_dir, store) = make_store();
        store.write_section(&manifest(b"a")).unwrap();
        let tmp: Vec<_> = std::fs::read_dir(store.root().join("tmp")).unwrap().collect();
        assert!(tmp.is_empty());
    }

    #[test]
    fn gc_removes_unlisted_blobs() {
        let (_dir, store) = make_store();
        let keep = ContentHash::from_bytes(b"keep");
        let stale = ContentHash::from_bytes(b"stale");
        store
            .put_blob(&ContentItem::from_text("k.js", "keep"), &keep, ".js")
            .unwrap();
        store
            .put_blob(&ContentItem::from_text("s.js", "stale"), &stale, ".js")
            .unwrap();

        let live: HashSet<String> = [blob_name(&keep, ".js")].into_iter().collect();
        assert_eq!(store.gc_blobs(&live).unwrap(), 1);
        assert!(store.has_blob(&keep, ".js"));
        assert!(!store.has_blob(&stale, ".js"));
    }

    #[test]
    fn list_sections_parses_fingerprints() {
        let (_dir, store) = make_store();
        let m = manifest(b"listed");
        store.write_section(&m).unwrap();
        let sections = store.list_sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].fingerprint, m.fingerprint);
        assert!(sections[0].size > 0);
    }

    #[test]
    fn clean_empties_root() {
        let (_dir, store) = make_store();
        store.write_section(&manifest(b"x")).unwrap();
        store.clean().unwrap();
        assert!(store.list_sections().is_empty());
        assert!(store.root().join("content").is_dir());
    }

    #[test]
    fn remove_section_reports_presence() {
        let (_dir, store) = make_store();
        let m = manifest(b"rm");
        store.write_section(&m).unwrap();
        assert!(store.remove_section(&m.fingerprint).unwrap());
        assert!(!store.remove_section(&m.fingerprint).unwrap());
    }

    #[test]
    fn locks_are_listed_and_removed() {
        let (_dir, store) = make_store();
        let fp = ContentHash::from_bytes(b"locked");
        drop(crate::lock::SectionLock::exclusive(&store.lock_path(&fp)).unwrap());
        std::fs::write(store.root().join("locks/stray.txt"), b"").unwrap();

        assert_eq!(store.list_locks(), [fp]);
        assert!(store.remove_lock(&fp).unwrap());
        assert!(!store.remove_lock(&fp).unwrap());
        assert!(store.list_locks().is_empty());
    }
}
