//! The build orchestrator.
//!
//! Each file type runs in an `Everything.<Type>` section that varies by the
//! configuration of that type and by the source and destination roots. When
//! nothing it depends on changed and its outputs are in place, the whole
//! file type is skipped. Otherwise its file sets run in parallel, each in
//! its own section, and are merged back into the parent so the parent's
//! record covers every input its children read. Style sheets and scripts
//! are built in parallel; images follow.

use std::time::Duration;

use grist_cache::{CacheSection, ContentItem, MeasureResult, OutputLog, SectionState, VaryBy};
use grist_common::{FileType, SectionId, WorkIssue, WorkOutcome};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::context::BuildContext;
use crate::error::PipelineError;
use crate::file_set::{run_file_set, FileSetRun};
use crate::images::build_images;

pub use crate::file_set::FileSetReport;

/// Result category of the serialized output log of a file type.
pub const LOG_CATEGORY: &str = "log";

/// What happened to one file type.
#[derive(Debug, Clone)]
pub struct FileTypeReport {
    /// The file type.
    pub file_type: FileType,
    /// Final state of the `Everything.<Type>` section.
    pub state: SectionState,
    /// Combined outcome of the file type and its file sets.
    pub outcome: WorkOutcome,
    /// File sets that ran. Empty when the file type was skipped.
    pub file_sets: Vec<FileSetReport>,
    /// Number of records in the output log.
    pub outputs: usize,
}

impl FileTypeReport {
    /// The report of a file set by name.
    pub fn file_set(&self, name: &str) -> Option<&FileSetReport> {
        self.file_sets.iter().find(|s| s.name == name)
    }
}

/// What happened in a build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// One report per file type, in pipeline order.
    pub file_types: Vec<FileTypeReport>,
    /// Wall time since the build context was created.
    pub elapsed: Duration,
    /// Section timings, if the context records them.
    pub timings: Vec<MeasureResult>,
}

impl BuildReport {
    /// Returns `true` if no file type failed.
    pub fn succeeded(&self) -> bool {
        self.file_types.iter().all(|t| t.outcome.is_cacheable())
    }

    /// The report of a file type.
    pub fn file_type(&self, file_type: FileType) -> Option<&FileTypeReport> {
        self.file_types.iter().find(|t| t.file_type == file_type)
    }

    /// Every issue reported during the build.
    pub fn issues(&self) -> impl Iterator<Item = &WorkIssue> {
        self.file_types.iter().flat_map(|t| t.outcome.issues())
    }
}

/// Builds every file type of the context's configuration.
///
/// Honors the `cache.clean` and `cache.clean_destination` settings before
/// anything runs. Per-file-set problems are reported in the returned
/// report; an `Err` means the build could not continue at all.
pub fn run_build(ctx: &BuildContext) -> Result<BuildReport, PipelineError> {
    let config = ctx.config();
    if config.cache.clean {
        ctx.clean_cache()?;
    }
    if config.cache.clean_destination {
        ctx.clean_destination()?;
    }
    info!(
        project = %config.project.name,
        config_type = %config.project.config_type,
        cache = ctx.cache().is_enabled(),
        "build started"
    );

    let (js, css) = rayon::join(
        || run_file_type(ctx, FileType::JavaScript),
        || run_file_type(ctx, FileType::StyleSheet),
    );
    let images = run_file_type(ctx, FileType::Image)?;

    let report = BuildReport {
        file_types: vec![js?, css?, images],
        elapsed: ctx.elapsed(),
        timings: ctx.measure().results(),
    };
    info!(
        elapsed_ms = report.elapsed.as_millis() as u64,
        succeeded = report.succeeded(),
        "build finished"
    );
    Ok(report)
}

fn run_file_type(ctx: &BuildContext, file_type: FileType) -> Result<FileTypeReport, PipelineError> {
    let config = ctx.config();
    let paths = ctx.paths();
    let id = SectionId::new(["Everything", file_type.section_name()]);

    let vary = VaryBy::new()
        .setting("fileType", &file_type)
        .setting("configType", &config.project.config_type)
        .setting("sourceDirectory", &paths.source)
        .setting("destinationDirectory", &paths.destination);
    let vary = match file_type {
        FileType::Image => vary.setting("images", &config.images),
        _ => vary
            .setting("fileSets", config.file_sets(file_type))
            .setting("resources", &config.resources),
    };

    let mut log = OutputLog::new(file_type);
    let mut file_sets = Vec::new();
    let mut run = ctx.run_section(id, vary, true, |section| {
        let outcome = match file_type {
            FileType::Image => build_images(ctx, section, &mut log)?,
            _ => build_file_sets(ctx, section, file_type, &mut log, &mut file_sets)?,
        };
        if outcome.is_cacheable() && section.state() == SectionState::Created {
            let item = ContentItem::from_text(&format!("{file_type}_log.json"), &log.to_json()?);
            section.add_result(&item, LOG_CATEGORY, false)?;
        }
        Ok(outcome)
    })?;

    if run.state() == SectionState::Skipped {
        match cached_log(&mut run.section) {
            Some(cached) => log = cached,
            None => {
                warn!(%file_type, "cached output log unavailable, keeping the existing one");
                log = OutputLog::load(&paths.logs, file_type).unwrap_or(log);
            }
        }
    }
    let log_path = log.save(&paths.logs)?;
    debug!(%file_type, path = %log_path.display(), records = log.records.len(), "output log written");

    Ok(FileTypeReport {
        file_type,
        state: run.state(),
        outcome: run.outcome.clone(),
        file_sets,
        outputs: log.records.len(),
    })
}

fn build_file_sets(
    ctx: &BuildContext,
    section: &mut CacheSection,
    file_type: FileType,
    log: &mut OutputLog,
    reports: &mut Vec<FileSetReport>,
) -> Result<WorkOutcome, PipelineError> {
    let runs: Vec<FileSetRun> = ctx
        .config()
        .file_sets(file_type)
        .par_iter()
        .map(|set| run_file_set(ctx, file_type, set))
        .collect::<Result<_, _>>()?;

    let mut outcome = WorkOutcome::Completed;
    for mut file_set in runs {
        if let Some(run) = file_set.run.as_mut() {
            section.merge_child(&mut run.section)?;
        }
        for r in file_set.records {
            log.record(r.inputs, &r.output, r.hash, r.pivots);
        }
        outcome = outcome.and(file_set.report.outcome.clone());
        reports.push(file_set.report);
    }
    Ok(outcome)
}

/// The output log saved with a section, if it has one.
pub(crate) fn cached_log(section: &mut CacheSection) -> Option<OutputLog> {
    let item = section
        .cached_content_items(LOG_CATEGORY, false)
        .into_iter()
        .next()?;
    let json = item.content_text().ok()?;
    OutputLog::from_json(&json).ok()
}
