//! Cache sections: fingerprinted units of work.
//!
//! A section is begun by a [`CacheManager`](crate::CacheManager) with an
//! identifier and the inputs it varies by. The caller then asks whether the
//! work can be skipped outright or restored from cache, and otherwise runs it,
//! adds its results and saves. A section is always ended, explicitly or when
//! it is dropped.
//!
//! ```text
//! Created ─┬─ can_be_skipped ─────────────► Skipped ─┐
//!          ├─ can_be_restored_from_cache ─► Restored ├─► ended
//!          └─ (work) add_result ── save ──► Saved ───┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use grist_common::{ContentHash, SectionId};
use tracing::{debug, info};

use crate::content_item::ContentItem;
use crate::dependency::SourceDependency;
use crate::error::CacheError;
use crate::hasher::ContentHasher;
use crate::lock::SectionLock;
use crate::manager::{Backing, Shared};
use crate::manifest::{CachedResult, SectionManifest};
use crate::vary_by::VaryBy;

/// Where a section is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    /// Begun; nothing decided yet.
    Created,
    /// The persisted results are already in place at the destination.
    Skipped,
    /// The persisted results are available from the store.
    Restored,
    /// The work ran and its results were persisted.
    Saved,
}

#[derive(Debug, Clone)]
struct PendingResult {
    category: String,
    item: ContentItem,
    hash: ContentHash,
    is_end_result: bool,
}

/// A fingerprinted unit of work.
pub struct CacheSection {
    id: SectionId,
    fingerprint: ContentHash,
    shared: Arc<Shared>,
    vary_items: Vec<ContentItem>,
    state: SectionState,
    ended: bool,
    loaded: Option<Option<SectionManifest>>,
    results: Vec<PendingResult>,
    dependencies: Vec<SourceDependency>,
}

impl CacheSection {
    pub(crate) fn begin(
        shared: Arc<Shared>,
        id: SectionId,
        vary_by: VaryBy,
    ) -> Result<Self, CacheError> {
        let fingerprint = vary_by.fingerprint(&id, &shared.hasher)?;
        shared.measure.start(&id);
        if let Some(backing) = &shared.backing {
            backing.touched.lock().insert(fingerprint);
        }
        debug!(section = %id, fingerprint = %fingerprint, "begin section");

        Ok(Self {
            id,
            fingerprint,
            shared,
            vary_items: vary_by.content_items().to_vec(),
            state: SectionState::Created,
            ended: false,
            loaded: None,
            results: Vec::new(),
            dependencies: Vec::new(),
        })
    }

    /// The section identifier.
    pub fn id(&self) -> &SectionId {
        &self.id
    }

    /// The fingerprint computed from the identifier and vary-by inputs.
    pub fn fingerprint(&self) -> ContentHash {
        self.fingerprint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SectionState {
        self.state
    }

    /// Returns `true` once [`end_section`](Self::end_section) has run.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns `true` if the persisted results of this section already exist
    /// at the destination, so neither work nor restoring is needed.
    ///
    /// Requires a valid persisted record whose discovered dependencies are
    /// unchanged and whose end results are present at the destination with
    /// the recorded hashes. A record without end results is always skippable.
    pub fn can_be_skipped(&mut self) -> bool {
        match self.state {
            SectionState::Skipped => return true,
            SectionState::Created if !self.ended => {}
            _ => return false,
        }
        self.ensure_loaded();
        let (Some(backing), Some(manifest)) = (self.shared.backing.as_ref(), self.manifest())
        else {
            return false;
        };
        let hasher = &self.shared.hasher;

        if !dependencies_current(manifest, hasher) {
            debug!(section = %self.id, "dependency changed, cannot skip");
            return false;
        }
        let outputs_present = manifest.end_results().all(|r| {
            let path = backing.destination_dir.join(&r.relative_path);
            hasher.file_hash(&path).is_ok_and(|h| h == r.hash)
        });
        if !outputs_present {
            debug!(section = %self.id, "end results missing at destination, cannot skip");
            return false;
        }

        info!(section = %self.id, "skipped, outputs up to date");
        self.state = SectionState::Skipped;
        true
    }

    /// Returns `true` if the results of this section can be restored from the
    /// store instead of running the work.
    ///
    /// Requires a valid persisted record whose discovered dependencies are
    /// unchanged and whose result blobs are all present.
    pub fn can_be_restored_from_cache(&mut self) -> bool {
        match self.state {
            SectionState::Restored => return true,
            SectionState::Created if !self.ended => {}
            _ => return false,
        }
        self.ensure_loaded();
        let (Some(backing), Some(manifest)) = (self.shared.backing.as_ref(), self.manifest())
        else {
            return false;
        };

        if !dependencies_current(manifest, &self.shared.hasher) {
            debug!(section = %self.id, "dependency changed, cannot restore");
            return false;
        }
        if let Some(missing) = manifest
            .all_results()
            .find(|r| !backing.store.has_blob(&r.hash, &r.extension))
        {
            debug!(section = %self.id, blob = %missing.blob_name(), "blob missing, cannot restore");
            return false;
        }

        info!(section = %self.id, "restored from cache");
        self.state = SectionState::Restored;
        true
    }

    /// Returns the persisted results of `category` as file-backed items that
    /// point into the store. Empty unless a valid record was found.
    pub fn cached_content_items(
        &mut self,
        category: &str,
        end_results_only: bool,
    ) -> Vec<ContentItem> {
        self.ensure_loaded();
        let (Some(backing), Some(manifest)) = (self.shared.backing.as_ref(), self.manifest())
        else {
            return Vec::new();
        };
        manifest
            .category(category)
            .iter()
            .filter(|r| !end_results_only || r.is_end_result)
            .map(|r| stored_item(backing, r))
            .collect()
    }

    /// Returns every persisted end result, across categories, as file-backed
    /// items that point into the store.
    pub fn cached_end_results(&mut self) -> Vec<ContentItem> {
        self.ensure_loaded();
        let (Some(backing), Some(manifest)) = (self.shared.backing.as_ref(), self.manifest())
        else {
            return Vec::new();
        };
        manifest
            .end_results()
            .map(|r| stored_item(backing, r))
            .collect()
    }

    /// Records a result of the work. Results keep their insertion order within
    /// a category.
    pub fn add_result(
        &mut self,
        item: &ContentItem,
        category: &str,
        is_end_result: bool,
    ) -> Result<(), CacheError> {
        self.ensure_open("add a result")?;
        let hash = item.content_hash(&self.shared.hasher)?;
        self.results.push(PendingResult {
            category: category.to_string(),
            item: item.clone(),
            hash,
            is_end_result,
        });
        Ok(())
    }

    /// Records a file the work read that is not part of the fingerprint.
    pub fn add_source_dependency(&mut self, path: &Path) -> Result<(), CacheError> {
        self.ensure_open("add a dependency")?;
        if self.shared.backing.is_none() {
            return Ok(());
        }
        let dep = SourceDependency::file(path, &self.shared.hasher)?;
        self.push_dependency(dep);
        Ok(())
    }

    /// Records a directory listing the work depended on. Adding, removing or
    /// editing a matching file invalidates the section, unless it lies below
    /// one of `excluded`.
    pub fn add_directory_dependency(
        &mut self,
        dir: &Path,
        pattern: &str,
        recursive: bool,
        excluded: &[PathBuf],
    ) -> Result<(), CacheError> {
        self.ensure_open("add a dependency")?;
        if self.shared.backing.is_none() {
            return Ok(());
        }
        let dep =
            SourceDependency::directory(dir, pattern, recursive, excluded, &self.shared.hasher)?;
        self.push_dependency(dep);
        Ok(())
    }

    /// Folds a child section's results and dependencies into this section.
    ///
    /// The child's file-backed vary-by inputs become file dependencies here,
    /// so a parent that does not vary by content still notices input edits.
    /// Results of a skipped child point at the destination; results of a
    /// restored child point into the store.
    pub fn merge_child(&mut self, child: &mut CacheSection) -> Result<(), CacheError> {
        self.ensure_open("merge a child")?;
        let Some(backing) = self.shared.backing.clone() else {
            return Ok(());
        };

        for item in &child.vary_items {
            if let Some(path) = item.file_path() {
                let dep = SourceDependency::file(path, &self.shared.hasher)?;
                self.push_dependency(dep);
            }
        }

        match child.state {
            SectionState::Created | SectionState::Saved => {
                self.results.extend(child.results.iter().cloned());
                for dep in &child.dependencies {
                    self.push_dependency(dep.clone());
                }
            }
            SectionState::Skipped | SectionState::Restored => {
                let skipped = child.state == SectionState::Skipped;
                child.ensure_loaded();
                let Some(manifest) = child.manifest() else {
                    return Ok(());
                };
                for (category, results) in &manifest.results {
                    for r in results {
                        let item = if skipped && r.is_end_result {
                            ContentItem::from_file(
                                &r.relative_path,
                                backing.destination_dir.join(&r.relative_path),
                            )
                            .with_pivots(r.pivots.clone())
                            .with_hash(r.hash)
                        } else {
                            stored_item(&backing, r)
                        };
                        self.results.push(PendingResult {
                            category: category.clone(),
                            item,
                            hash: r.hash,
                            is_end_result: r.is_end_result,
                        });
                    }
                }
                for dep in &manifest.dependencies {
                    self.push_dependency(dep.clone());
                }
            }
        }
        Ok(())
    }

    /// Persists the recorded results and dependencies under this section's
    /// fingerprint.
    ///
    /// Only meaningful after the work succeeded. On a section that was skipped,
    /// restored, already saved or ended this is a no-op.
    pub fn save(&mut self) -> Result<(), CacheError> {
        if self.ended || self.state != SectionState::Created {
            debug!(section = %self.id, state = ?self.state, ended = self.ended, "save ignored");
            return Ok(());
        }
        let Some(backing) = self.shared.backing.clone() else {
            self.state = SectionState::Saved;
            return Ok(());
        };

        let _lock = SectionLock::exclusive(&backing.store.lock_path(&self.fingerprint))?;

        let mut manifest =
            SectionManifest::new(self.id.clone(), self.fingerprint, &backing.tool_version);
        manifest.dependencies = self.dependencies.clone();
        for pending in &self.results {
            let extension = pending.item.extension();
            backing
                .store
                .put_blob(&pending.item, &pending.hash, &extension)?;
            manifest
                .results
                .entry(pending.category.clone())
                .or_default()
                .push(CachedResult {
                    relative_path: pending.item.relative_path().to_string(),
                    pivots: pending.item.pivots().clone(),
                    hash: pending.hash,
                    extension,
                    is_end_result: pending.is_end_result,
                });
        }
        backing.store.write_section(&manifest)?;

        info!(
            section = %self.id,
            results = self.results.len(),
            dependencies = self.dependencies.len(),
            "saved to cache"
        );
        self.loaded = Some(Some(manifest));
        self.state = SectionState::Saved;
        Ok(())
    }

    /// Ends the section and stops its timer. Idempotent; also runs on drop.
    pub fn end_section(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.shared.measure.end(&self.id);
        debug!(section = %self.id, state = ?self.state, "end section");
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), CacheError> {
        let reason = if self.ended {
            "the section has already ended"
        } else {
            match self.state {
                SectionState::Created => return Ok(()),
                SectionState::Skipped => "the section was skipped",
                SectionState::Restored => "the section was restored from cache",
                SectionState::Saved => "the section was already saved",
            }
        };
        Err(CacheError::SectionState {
            section: self.id.to_string(),
            operation,
            reason,
        })
    }

    fn push_dependency(&mut self, dep: SourceDependency) {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    fn ensure_loaded(&mut self) {
        if self.loaded.is_some() {
            return;
        }
        let manifest = self.shared.backing.as_ref().and_then(|backing| {
            let lock_path = backing.store.lock_path(&self.fingerprint);
            let _lock = match SectionLock::shared(&lock_path) {
                Ok(lock) => lock,
                Err(e) => {
                    debug!(section = %self.id, error = %e, "cannot lock section, treating as miss");
                    return None;
                }
            };
            backing.store.read_section(&self.fingerprint)
        });
        self.loaded = Some(manifest);
    }

    fn manifest(&self) -> Option<&SectionManifest> {
        self.loaded.as_ref().and_then(Option::as_ref)
    }
}

impl Drop for CacheSection {
    fn drop(&mut self) {
        self.end_section();
    }
}

impl std::fmt::Debug for CacheSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSection")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .field("state", &self.state)
            .field("ended", &self.ended)
            .field("results", &self.results.len())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

fn dependencies_current(manifest: &SectionManifest, hasher: &ContentHasher) -> bool {
    manifest.dependencies.iter().all(|d| d.is_current(hasher))
}

fn stored_item(backing: &Backing, r: &CachedResult) -> ContentItem {
    ContentItem::from_file(&r.relative_path, backing.store.blob_path(&r.hash, &r.extension))
        .with_pivots(r.pivots.clone())
        .with_hash(r.hash)
}
