//! Units of buildable content.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use grist_common::{ContentHash, PivotSet};

use crate::error::CacheError;
use crate::hasher::ContentHasher;

/// Where the bytes of a [`ContentItem`] live.
#[derive(Clone, Debug)]
pub enum ContentSource {
    /// Bytes held in memory.
    Memory(Arc<[u8]>),
    /// Bytes on disk at the given path.
    File(PathBuf),
    /// Bytes in memory that are also known to exist on disk.
    MemoryAndFile {
        /// The in-memory copy.
        bytes: Arc<[u8]>,
        /// The on-disk copy.
        path: PathBuf,
    },
}

/// A piece of content produced or consumed by an activity.
///
/// The content hash is computed over the bytes on first request and then
/// cached on the item. An item read from a file and an item holding the same
/// bytes in memory hash identically.
#[derive(Clone, Debug)]
pub struct ContentItem {
    relative_path: String,
    pivots: PivotSet,
    source: ContentSource,
    hash: OnceLock<ContentHash>,
}

impl ContentItem {
    /// Creates an in-memory item.
    pub fn from_bytes(relative_path: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(relative_path, ContentSource::Memory(bytes.into()))
    }

    /// Creates an in-memory item from text, encoded as UTF-8.
    pub fn from_text(relative_path: &str, text: &str) -> Self {
        Self::from_bytes(relative_path, text.as_bytes())
    }

    /// Creates an item backed by a file on disk.
    pub fn from_file(relative_path: &str, path: impl Into<PathBuf>) -> Self {
        Self::new(relative_path, ContentSource::File(path.into()))
    }

    /// Creates an item whose bytes are both in memory and on disk.
    pub fn from_memory_and_file(
        relative_path: &str,
        bytes: impl Into<Arc<[u8]>>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(
            relative_path,
            ContentSource::MemoryAndFile {
                bytes: bytes.into(),
                path: path.into(),
            },
        )
    }

    fn new(relative_path: &str, source: ContentSource) -> Self {
        Self {
            relative_path: normalize_relative_path(relative_path),
            pivots: PivotSet::default(),
            source,
            hash: OnceLock::new(),
        }
    }

    /// Sets the pivots this item was produced for.
    pub fn with_pivots(mut self, pivots: PivotSet) -> Self {
        self.pivots = pivots;
        self
    }

    /// Pre-populates the content hash, for items whose hash is already known.
    pub fn with_hash(self, hash: ContentHash) -> Self {
        let _ = self.hash.set(hash);
        self
    }

    /// Returns the same content under a different relative path.
    pub fn with_relative_path(mut self, relative_path: &str) -> Self {
        self.relative_path = normalize_relative_path(relative_path);
        self
    }

    /// Relative output path, always using `/` separators.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Extension of the relative path including the leading dot, or an empty
    /// string if there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.relative_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default()
    }

    /// Pivots this item was produced for.
    pub fn pivots(&self) -> &PivotSet {
        &self.pivots
    }

    /// Where the bytes live.
    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    /// The backing file, if the item has one.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.source {
            ContentSource::Memory(_) => None,
            ContentSource::File(path) | ContentSource::MemoryAndFile { path, .. } => Some(path),
        }
    }

    /// Returns the bytes, reading the backing file if they are not in memory.
    pub fn content(&self) -> Result<Cow<'_, [u8]>, CacheError> {
        match &self.source {
            ContentSource::Memory(bytes) | ContentSource::MemoryAndFile { bytes, .. } => {
                Ok(Cow::Borrowed(bytes))
            }
            ContentSource::File(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(CacheError::io(path)),
        }
    }

    /// Returns the content as text. Invalid UTF-8 is replaced.
    pub fn content_text(&self) -> Result<String, CacheError> {
        Ok(String::from_utf8_lossy(&self.content()?).into_owned())
    }

    /// Returns the content hash, computing it on first use.
    ///
    /// File-backed items go through the hasher's memo table.
    pub fn content_hash(&self, hasher: &ContentHasher) -> Result<ContentHash, CacheError> {
        if let Some(hash) = self.hash.get() {
            return Ok(*hash);
        }
        let hash = match &self.source {
            ContentSource::Memory(bytes) | ContentSource::MemoryAndFile { bytes, .. } => {
                ContentHash::from_bytes(bytes)
            }
            ContentSource::File(path) => hasher.file_hash(path)?,
        };
        let _ = self.hash.set(hash);
        Ok(hash)
    }

    /// Writes the content to `destination_root/relative_path`, creating parent
    /// directories. Returns the written path.
    pub fn write_to_destination(&self, destination_root: &Path) -> Result<PathBuf, CacheError> {
        let target = destination_root.join(&self.relative_path);
        self.write_to(&target)?;
        Ok(target)
    }

    /// Writes the content to an explicit path, creating parent directories.
    pub fn write_to(&self, target: &Path) -> Result<(), CacheError> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(CacheError::io(parent))?;
        }
        match &self.source {
            ContentSource::File(path) => {
                if same_file(path, target) {
                    return Ok(());
                }
                std::fs::copy(path, target).map_err(CacheError::io(target))?;
            }
            ContentSource::Memory(bytes) | ContentSource::MemoryAndFile { bytes, .. } => {
                std::fs::write(target, bytes).map_err(CacheError::io(target))?;
            }
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Normalizes a relative path to `/` separators without a leading `./` or `/`.
pub fn normalize_relative_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(normalize_relative_path("css\\site.css"), "css/site.css");
        assert_eq!(normalize_relative_path("./css/site.css"), "css/site.css");
        assert_eq!(normalize_relative_path("/js/app.js"), "js/app.js");
        assert_eq!(normalize_relative_path("a.png"), "a.png");
    }

    #[test]
    fn memory_and_file_hash_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.css");
        std::fs::write(&path, "body{margin:0}").unwrap();

        let hasher = ContentHasher::new();
        let file = ContentItem::from_file("site.css", &path);
        let memory = ContentItem::from_text("site.css", "body{margin:0}");
        assert_eq!(
            file.content_hash(&hasher).unwrap(),
            memory.content_hash(&hasher).unwrap()
        );
    }

    #[test]
    fn hash_is_computed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "one").unwrap();

        let hasher = ContentHasher::new();
        let item = ContentItem::from_file("a.js", &path);
        let first = item.content_hash(&hasher).unwrap();

        // The item keeps its hash even after the file changes underneath it.
        std::fs::write(&path, "two, longer").unwrap();
        assert_eq!(item.content_hash(&hasher).unwrap(), first);
    }

    #[test]
    fn prepopulated_hash_is_used() {
        let hasher = ContentHasher::new();
        let known = ContentHash::from_bytes(b"elsewhere");
        let item = ContentItem::from_file("x.png", "/does/not/exist.png").with_hash(known);
        assert_eq!(item.content_hash(&hasher).unwrap(), known);
        assert_eq!(hasher.stats().misses, 0);
    }

    #[test]
    fn missing_file_hash_errors() {
        let hasher = ContentHasher::new();
        let item = ContentItem::from_file("x.css", "/does/not/exist.css");
        assert!(item.content_hash(&hasher).unwrap_err().is_not_found());
    }

    #[test]
    fn write_memory_item_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let item = ContentItem::from_text("css/en-us/site.css", "a{}");
        let written = item.write_to_destination(dir.path()).unwrap();
        assert_eq!(written, dir.path().join("css/en-us/site.css"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "a{}");
    }

    #[test]
    fn write_file_item_copies() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("logo.png");
        std::fs::write(&src, [1u8, 2, 3]).unwrap();
        let item = ContentItem::from_file("images/logo.png", &src);

        let out = tempfile::tempdir().unwrap();
        let written = item.write_to_destination(out.path()).unwrap();
        assert_eq!(std::fs::read(written).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn write_onto_itself_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.css");
        std::fs::write(&src, "x").unwrap();
        let item = ContentItem::from_file("a.css", &src);
        item.write_to_destination(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "x");
    }

    #[test]
    fn extension_includes_dot() {
        assert_eq!(ContentItem::from_text("a/b.css", "").extension(), ".css");
        assert_eq!(ContentItem::from_text("a/noext", "").extension(), "");
    }

    #[test]
    fn pivots_are_kept() {
        let pivots = PivotSet::default().with(PivotSet::LOCALE, "en-us");
        let item = ContentItem::from_text("a.css", "").with_pivots(pivots.clone());
        assert_eq!(item.pivots(), &pivots);
        assert_eq!(item.pivots().locale(), Some("en-us"));
    }
}
