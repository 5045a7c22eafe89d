//! Cache managers: the entry point activities use to begin sections.
//!
//! [`FileCacheManager`] persists sections under a cache root. The
//! [`NullCacheManager`] runs the exact same section code path but never finds
//! or persists anything, which is how caching is disabled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use grist_common::{ContentHash, SectionId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::hasher::ContentHasher;
use crate::lock::SectionLock;
use crate::manifest::SectionManifest;
use crate::measure::TimeMeasure;
use crate::section::CacheSection;
use crate::store::SectionStore;
use crate::vary_by::VaryBy;

/// Where and how a [`FileCacheManager`] persists sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Cache root directory.
    pub root: PathBuf,
    /// Output root that end results are checked against when deciding
    /// whether a section can be skipped.
    pub destination_dir: PathBuf,
    /// Version of the tool; records written by other versions are misses.
    pub tool_version: String,
}

impl CacheSettings {
    /// Creates settings for the given cache root and destination.
    pub fn new(root: &Path, destination_dir: &Path, tool_version: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            destination_dir: destination_dir.to_path_buf(),
            tool_version: tool_version.to_string(),
        }
    }
}

/// Which cache entries [`CacheManager::prune`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrunePolicy {
    /// Remove unreadable section files, blobs no section references and
    /// leftover partial writes.
    Unreferenced,
    /// Additionally remove every section not begun by this manager, then
    /// collect the blobs that became unreferenced.
    UnusedThisSession,
}

/// Counts of what a prune removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Section files removed.
    pub sections_removed: usize,
    /// Content blobs removed.
    pub blobs_removed: usize,
}

/// Size of the cache root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of section files.
    pub sections: usize,
    /// Total bytes of section files.
    pub section_bytes: u64,
    /// Number of content blobs.
    pub blobs: usize,
    /// Total bytes of content blobs.
    pub blob_bytes: u64,
}

/// Begins sections and manages the cache root.
pub trait CacheManager: Send + Sync {
    /// Begins a section identified by `id` whose fingerprint varies by
    /// `vary_by`. Fails if a vary-by input cannot be hashed or serialized.
    fn begin_section(&self, id: SectionId, vary_by: VaryBy) -> Result<CacheSection, CacheError>;

    /// The hasher sections use.
    fn hasher(&self) -> &Arc<ContentHasher>;

    /// Returns `true` if sections can be found and persisted.
    fn is_enabled(&self) -> bool;

    /// The cache root, if there is one.
    fn root(&self) -> Option<&Path>;

    /// Deletes and recreates the cache root.
    fn clean_cache(&self) -> Result<(), CacheError>;

    /// Removes cache entries according to `policy`.
    fn prune(&self, policy: PrunePolicy) -> Result<PruneReport, CacheError>;

    /// Reports the size of the cache root.
    fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Reads the record saved under a fingerprint.
    fn lookup(&self, fingerprint: &ContentHash) -> Option<SectionManifest>;

    /// Reads every valid record, ordered by section identifier.
    fn sections(&self) -> Vec<SectionManifest>;
}

pub(crate) struct Shared {
    pub(crate) hasher: Arc<ContentHasher>,
    pub(crate) measure: Arc<dyn TimeMeasure>,
    pub(crate) backing: Option<Arc<Backing>>,
}

pub(crate) struct Backing {
    pub(crate) store: SectionStore,
    pub(crate) destination_dir: PathBuf,
    pub(crate) tool_version: String,
    pub(crate) touched: Mutex<HashSet<ContentHash>>,
}

/// Persists sections under a cache root.
pub struct FileCacheManager {
    shared: Arc<Shared>,
    backing: Arc<Backing>,
}

impl FileCacheManager {
    /// Creates a manager for `settings`, creating the cache root layout.
    pub fn new(
        settings: CacheSettings,
        hasher: Arc<ContentHasher>,
        measure: Arc<dyn TimeMeasure>,
    ) -> Result<Self, CacheError> {
        let store = SectionStore::new(&settings.root, &settings.tool_version);
        store.ensure_layout()?;
        debug!(root = %settings.root.display(), "cache enabled");

        let backing = Arc::new(Backing {
            store,
            destination_dir: settings.destination_dir,
            tool_version: settings.tool_version,
            touched: Mutex::new(HashSet::new()),
        });
        let shared = Arc::new(Shared {
            hasher,
            measure,
            backing: Some(Arc::clone(&backing)),
        });
        Ok(Self { shared, backing })
    }

    /// The underlying store.
    pub fn store(&self) -> &SectionStore {
        &self.backing.store
    }

    /// Fingerprints begun through this manager so far.
    pub fn touched(&self) -> HashSet<ContentHash> {
        self.backing.touched.lock().clone()
    }

    /// Removes a section and its lock file under the exclusive lock.
    fn remove_section(&self, fingerprint: &ContentHash) -> Result<bool, CacheError> {
        let store = &self.backing.store;
        let _lock = SectionLock::exclusive(&store.lock_path(fingerprint))?;
        let removed = store.remove_section(fingerprint)?;
        self.remove_lock_file(fingerprint);
        Ok(removed)
    }

    /// Removes lock files of fingerprints that have no section. Returns the
    /// number removed.
    fn remove_orphan_locks(&self) -> Result<usize, CacheError> {
        let store = &self.backing.store;
        let mut removed = 0;
        for fingerprint in store.list_locks() {
            if store.section_path(&fingerprint).is_file() {
                continue;
            }
            let _lock = SectionLock::exclusive(&store.lock_path(&fingerprint))?;
            // A concurrent build may have saved it while we waited.
            if !store.section_path(&fingerprint).is_file()
                && self.remove_lock_file(&fingerprint)
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // Some platforms refuse to delete a file with an open handle.
    fn remove_lock_file(&self, fingerprint: &ContentHash) -> bool {
        match self.backing.store.remove_lock(fingerprint) {
            Ok(removed) => removed,
            Err(e) => {
                debug!(%fingerprint, error = %e, "lock file not removed");
                false
            }
        }
    }
}

impl CacheManager for FileCacheManager {
    fn begin_section(&self, id: SectionId, vary_by: VaryBy) -> Result<CacheSection, CacheError> {
        CacheSection::begin(Arc::clone(&self.shared), id, vary_by)
    }

    fn hasher(&self) -> &Arc<ContentHasher> {
        &self.shared.hasher
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn root(&self) -> Option<&Path> {
        Some(self.backing.store.root())
    }

    fn clean_cache(&self) -> Result<(), CacheError> {
        info!(root = %self.backing.store.root().display(), "cleaning cache");
        self.backing.store.clean()
    }

    fn prune(&self, policy: PrunePolicy) -> Result<PruneReport, CacheError> {
        let store = &self.backing.store;
        let touched = self.touched();
        let mut report = PruneReport::default();
        let mut live = HashSet::new();

        for stored in store.list_sections() {
            let keep = match store.read_section(&stored.fingerprint) {
                Some(manifest) => {
                    let used = policy == PrunePolicy::Unreferenced
                        || touched.contains(&stored.fingerprint);
                    if used {
                        live.extend(manifest.all_results().map(|r| r.blob_name()));
                    }
                    used
                }
                None => {
                    warn!(path = %stored.path.display(), "removing unreadable section");
                    false
                }
            };
            if !keep && self.remove_section(&stored.fingerprint)? {
                report.sections_removed += 1;
            }
        }

        report.blobs_removed = store.gc_blobs(&live)?;
        let locks_removed = self.remove_orphan_locks()?;

        let tmp = store.root().join("tmp");
        if let Ok(entries) = std::fs::read_dir(&tmp) {
            for entry in entries.filter_map(|e| e.ok()) {
                let _ = std::fs::remove_file(entry.path());
            }
        }

        info!(
            sections = report.sections_removed,
            blobs = report.blobs_removed,
            locks = locks_removed,
            "pruned cache"
        );
        Ok(report)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let store = &self.backing.store;
        let sections = store.list_sections();
        let blobs = store.list_blobs();
        Ok(CacheStats {
            sections: sections.len(),
            section_bytes: sections.iter().map(|s| s.size).sum(),
            blobs: blobs.len(),
            blob_bytes: blobs.iter().map(|b| b.size).sum(),
        })
    }

    fn lookup(&self, fingerprint: &ContentHash) -> Option<SectionManifest> {
        self.backing.store.read_section(fingerprint)
    }

    fn sections(&self) -> Vec<SectionManifest> {
        let mut manifests: Vec<_> = self
            .backing
            .store
            .list_sections()
            .into_iter()
            .filter_map(|s| self.backing.store.read_section(&s.fingerprint))
            .collect();
        manifests.sort_by(|a, b| a.id.cmp(&b.id).then(a.created_unix.cmp(&b.created_unix)));
        manifests
    }
}

/// A manager that never finds and never persists anything.
pub struct NullCacheManager {
    shared: Arc<Shared>,
}

impl NullCacheManager {
    /// Creates a disabled manager.
    pub fn new(hasher: Arc<ContentHasher>, measure: Arc<dyn TimeMeasure>) -> Self {
        Self {
            shared: Arc::new(Shared {
                hasher,
                measure,
                backing: None,
            }),
        }
    }
}

impl CacheManager for NullCacheManager {
    fn begin_section(&self, id: SectionId, vary_by: VaryBy) -> Result<CacheSection, CacheError> {
        CacheSection::begin(Arc::clone(&self.shared), id, vary_by)
    }

    fn hasher(&self) -> &Arc<ContentHasher> {
        &self.shared.hasher
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn root(&self) -> Option<&Path> {
        None
    }

    fn clean_cache(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn prune(&self, _policy: PrunePolicy) -> Result<PruneReport, CacheError> {
        Ok(PruneReport::default())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats::default())
    }

    fn lookup(&self, _fingerprint: &ContentHash) -> Option<SectionManifest> {
        None
    }

    fn sections(&self) -> Vec<SectionManifest> {
        Vec::new()
    }
}
