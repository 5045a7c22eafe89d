//! Images: binary assets copied to content-hashed names.

use grist_cache::{hashed_output_path, CacheSection, ContentItem, OutputLog};
use grist_common::{FileType, PivotSet, WorkOutcome};
use tracing::debug;

use crate::build::cached_log;
use crate::context::BuildContext;
use crate::error::PipelineError;
use crate::file_set::HASHED_CATEGORY;
use crate::inputs::resolve_inputs;

/// Copies every configured image into the `images/` prefix of the
/// destination under its content hash, recording each image as a
/// dependency of `section`.
pub(crate) fn build_images(
    ctx: &BuildContext,
    section: &mut CacheSection,
    log: &mut OutputLog,
) -> Result<WorkOutcome, PipelineError> {
    let destination = &ctx.paths().destination;
    if section.can_be_restored_from_cache() {
        for item in section.cached_end_results() {
            item.write_to_destination(destination)?;
        }
        if let Some(cached) = cached_log(section) {
            *log = cached;
        }
        return Ok(WorkOutcome::Completed);
    }

    let inputs = resolve_inputs(ctx, &ctx.config().images.inputs)?;
    if let Some(issue) = inputs.missing.into_iter().next() {
        return Ok(WorkOutcome::Failed(issue));
    }
    for glob in &inputs.globs {
        section.add_directory_dependency(
            &glob.dir,
            &glob.pattern,
            glob.recursive,
            ctx.generated_dirs(),
        )?;
    }

    for input in &inputs.files {
        section.add_source_dependency(&input.path)?;
        let hash = ctx.hasher().file_hash(&input.path)?;
        let extension = input
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let relative_path = hashed_output_path(FileType::Image.as_str(), &hash, extension);
        let item = ContentItem::from_file(&relative_path, &input.path).with_hash(hash);
        item.write_to_destination(destination)?;
        section.add_result(&item, HASHED_CATEGORY, true)?;
        log.record([&input.relative_path], &relative_path, hash, PivotSet::new());
    }
    debug!(count = inputs.files.len(), "images hashed");
    Ok(WorkOutcome::Completed)
}
