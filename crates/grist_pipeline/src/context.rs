//! The build context: objects shared by every activity of one build.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use grist_cache::dependency::list_matching_files;
use grist_cache::{
    CacheManager, CacheSection, CacheSettings, ContentHasher, FileCacheManager, NullCacheManager,
    NullMeasure, RecordingMeasure, SectionState, TimeMeasure, VaryBy,
};
use grist_common::{SectionId, WorkOutcome};
use grist_config::{resolve_paths, BuildConfig, ResolvedPaths};
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// Version recorded in every cache entry. Entries written by other versions
/// are ignored.
pub const TOOL_VERSION: &str = concat!("grist-", env!("CARGO_PKG_VERSION"));

/// Configuration, hasher, cache and timer for one build.
///
/// The hasher and the cache manager are created once here and shared by
/// every section of the build, including sections running on other threads.
pub struct BuildContext {
    config: BuildConfig,
    paths: ResolvedPaths,
    hasher: Arc<ContentHasher>,
    cache: Arc<dyn CacheManager>,
    measure: Arc<dyn TimeMeasure>,
    session_start: SystemTime,
    generated_dirs: Vec<PathBuf>,
    available_files: OnceLock<Vec<(String, PathBuf)>>,
}

/// A section after [`BuildContext::run_section`] finished with it.
#[derive(Debug)]
pub struct SectionRun {
    /// The ended section. Parents merge it to inherit its results and
    /// dependencies.
    pub section: CacheSection,
    /// What the work reported. `Completed` when the section was skipped.
    pub outcome: WorkOutcome,
}

impl SectionRun {
    /// Final lifecycle state of the section.
    pub fn state(&self) -> SectionState {
        self.section.state()
    }
}

impl BuildContext {
    /// Creates a context for a project. Timings are recorded only when
    /// `cache.measure` is set.
    pub fn new(config: BuildConfig, project_dir: &Path) -> Result<Self, PipelineError> {
        let measure: Arc<dyn TimeMeasure> = if config.cache.measure {
            Arc::new(RecordingMeasure::new())
        } else {
            Arc::new(NullMeasure)
        };
        Self::with_measure(config, project_dir, measure)
    }

    /// Creates a context that reports section timings to `measure`.
    pub fn with_measure(
        config: BuildConfig,
        project_dir: &Path,
        measure: Arc<dyn TimeMeasure>,
    ) -> Result<Self, PipelineError> {
        let paths = resolve_paths(&config, project_dir)?;
        let hasher = Arc::new(ContentHasher::new());

        let cache: Arc<dyn CacheManager> = if config.cache.enabled {
            let settings = CacheSettings::new(&paths.cache_root, &paths.destination, TOOL_VERSION);
            Arc::new(FileCacheManager::new(
                settings,
                Arc::clone(&hasher),
                Arc::clone(&measure),
            )?)
        } else {
            debug!("cache disabled");
            Arc::new(NullCacheManager::new(Arc::clone(&hasher), Arc::clone(&measure)))
        };

        let generated_dirs = vec![
            paths.destination.clone(),
            paths.logs.clone(),
            paths.cache_root.clone(),
        ];

        Ok(Self {
            generated_dirs,
            config,
            paths,
            hasher,
            cache,
            measure,
            session_start: SystemTime::now(),
            available_files: OnceLock::new(),
        })
    }

    /// The build configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Absolute source, destination, log and cache directories.
    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// The shared content hasher.
    pub fn hasher(&self) -> &Arc<ContentHasher> {
        &self.hasher
    }

    /// The cache manager.
    pub fn cache(&self) -> &Arc<dyn CacheManager> {
        &self.cache
    }

    /// The section timer.
    pub fn measure(&self) -> &Arc<dyn TimeMeasure> {
        &self.measure
    }

    /// Directories the build writes to. Source listings and directory
    /// dependencies leave them out, so outputs never invalidate their inputs.
    pub fn generated_dirs(&self) -> &[PathBuf] {
        &self.generated_dirs
    }

    /// When this context was created.
    pub fn session_start(&self) -> SystemTime {
        self.session_start
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.session_start.elapsed().unwrap_or_default()
    }

    /// Empties the cache root.
    pub fn clean_cache(&self) -> Result<(), PipelineError> {
        self.cache.clean_cache()?;
        info!("cache cleaned");
        Ok(())
    }

    /// Deletes the destination and log directories.
    pub fn clean_destination(&self) -> Result<(), PipelineError> {
        for dir in [&self.paths.destination, &self.paths.logs] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => info!(dir = %dir.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(PipelineError::Io {
                        path: dir.clone(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    /// Every file under the source root, as sorted `(relative path, path)`
    /// pairs. Files under the destination, log and cache directories are
    /// left out. Listed once per context.
    pub fn available_files(&self) -> Result<&[(String, PathBuf)], PipelineError> {
        if let Some(files) = self.available_files.get() {
            return Ok(files);
        }
        let files = list_matching_files(&self.paths.source, "**", true, &self.generated_dirs)?;
        debug!(count = files.len(), "listed source files");
        Ok(self.available_files.get_or_init(|| files))
    }

    /// Runs `work` inside a cache section.
    ///
    /// A skippable section whose outputs are already in place is ended
    /// without running the work. Otherwise the work runs and the section is
    /// saved, unless the work reported [`WorkOutcome::Failed`]. The section
    /// is ended in every case, including when the work returns an error.
    pub fn run_section<F>(
        &self,
        id: SectionId,
        vary_by: VaryBy,
        skippable: bool,
        work: F,
    ) -> Result<SectionRun, PipelineError>
    where
        F: FnOnce(&mut CacheSection) -> Result<WorkOutcome, PipelineError>,
    {
        let mut section = self.cache.begin_section(id, vary_by)?;
        if skippable && section.can_be_skipped() {
            section.end_section();
            return Ok(SectionRun {
                section,
                outcome: WorkOutcome::Completed,
            });
        }

        let outcome = work(&mut section)?;
        if outcome.is_cacheable() {
            section.save()?;
        } else {
            for issue in outcome.issues() {
                warn!(section = %section.id(), %issue, "work failed, not cached");
            }
        }
        section.end_section();
        Ok(SectionRun { section, outcome })
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("project", &self.config.project.name)
            .field("paths", &self.paths)
            .field("cache_enabled", &self.cache.is_enabled())
            .finish()
    }
}
