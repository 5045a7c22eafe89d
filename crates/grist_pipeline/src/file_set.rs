//! One file set: bundle, localize per variant, write content-hashed outputs.

use std::path::Path;

use grist_cache::{
    hashed_output_path, CacheSection, ContentHasher, ContentItem, OutputRecord, SectionState,
    TextEncoding, VaryBy,
};
use grist_common::{FileType, IssueCode, SectionId, WorkIssue, WorkOutcome};
use grist_config::FileSetConfig;
use tracing::{debug, warn};

use crate::bundle::run_bundle;
use crate::context::{BuildContext, SectionRun};
use crate::error::PipelineError;
use crate::inputs::{resolve_inputs, InputFile};
use crate::localize::{load_resources, replace_tokens, variants, Resources};

/// Result category of the content-hashed outputs.
pub const HASHED_CATEGORY: &str = "hashed";

/// What happened to one file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSetReport {
    /// File set name.
    pub name: String,
    /// Final state of the file set section; `None` if it was not begun.
    pub state: Option<SectionState>,
    /// What the work reported.
    pub outcome: WorkOutcome,
}

/// A finished file set: its report, output log records and section.
#[derive(Debug)]
pub(crate) struct FileSetRun {
    pub report: FileSetReport,
    pub records: Vec<OutputRecord>,
    pub run: Option<SectionRun>,
}

/// Identifier of a file set section, e.g. `CssFileSet.site`.
pub fn section_id(file_type: FileType, name: &str) -> SectionId {
    SectionId::new([format!("{}FileSet", file_type.section_name()), name.to_string()])
}

/// Runs one file set inside its own section.
///
/// The section varies by the input files, the locale and theme resource
/// files and the file set settings. Unusable file sets are not begun: an
/// output without an extension or an empty input list is a warning, a
/// missing input or resource file is a failure.
pub(crate) fn run_file_set(
    ctx: &BuildContext,
    file_type: FileType,
    set: &FileSetConfig,
) -> Result<FileSetRun, PipelineError> {
    let not_run = |outcome: WorkOutcome| -> Result<FileSetRun, PipelineError> {
        for issue in outcome.issues() {
            warn!(file_set = %set.name, %issue, "file set not built");
        }
        Ok(FileSetRun {
            report: FileSetReport {
                name: set.name.clone(),
                state: None,
                outcome,
            },
            records: Vec::new(),
            run: None,
        })
    };

    let Some(extension) = output_extension(&set.output) else {
        return not_run(WorkOutcome::CompletedWithWarnings(vec![WorkIssue::new(
            IssueCode::InvalidOutput,
            format!("file set '{}' has no output name with an extension", set.name),
        )]));
    };
    let inputs = resolve_inputs(ctx, &set.inputs)?;
    if let Some(issue) = inputs.missing.first() {
        return not_run(WorkOutcome::Failed(issue.clone()));
    }
    if inputs.files.is_empty() {
        return not_run(WorkOutcome::CompletedWithWarnings(vec![WorkIssue::new(
            IssueCode::MissingInput,
            format!("file set '{}' has no inputs", set.name),
        )]));
    }
    let resources = match PivotResources::load(ctx, set) {
        Ok(resources) => resources,
        Err(issue) => return not_run(WorkOutcome::Failed(issue)),
    };

    let vary = VaryBy::new()
        .items(inputs.files.iter().map(InputFile::content_item))
        .items(resources.items.iter().cloned())
        .setting("fileType", &file_type)
        .setting("output", &set.output)
        .setting("locales", &set.locales)
        .setting("themes", &set.themes)
        .setting("configType", &ctx.config().project.config_type);

    let id = section_id(file_type, &set.name);
    let input_paths: Vec<String> = inputs
        .files
        .iter()
        .map(|f| f.relative_path.clone())
        .collect();
    let destination = &ctx.paths().destination;
    let mut records = Vec::new();

    let mut run = ctx.run_section(id.clone(), vary, true, |section| {
        for glob in &inputs.globs {
            section.add_directory_dependency(
                &glob.dir,
                &glob.pattern,
                glob.recursive,
                ctx.generated_dirs(),
            )?;
        }

        if section.can_be_restored_from_cache() {
            for item in section.cached_end_results() {
                item.write_to_destination(destination)?;
            }
            records = cached_records(section, &input_paths, ctx.hasher())?;
            return Ok(WorkOutcome::Completed);
        }

        let bundled = run_bundle(ctx, &id, file_type, &set.output, &inputs.files)?;
        let mut bundle_run = bundled.run;
        section.merge_child(&mut bundle_run.section)?;
        let Some(text) = bundled.text else {
            return Ok(bundle_run.outcome);
        };

        let mut warnings = Vec::new();
        for variant in variants(&resources.locales, &resources.themes) {
            let output = if variant.pivots.is_empty() {
                text.clone()
            } else {
                let (output, unresolved) = replace_tokens(&text, &variant.resources);
                warnings.extend(unresolved.into_iter().map(|name| {
                    WorkIssue::new(
                        IssueCode::UnresolvedToken,
                        format!(
                            "token '%{name}%' has no value in file set '{}' ({})",
                            set.name, variant.pivots
                        ),
                    )
                }));
                output
            };

            let hash = ContentHasher::compute_content_hash(&output, TextEncoding::Utf8);
            let relative_path = hashed_output_path(file_type.as_str(), &hash, extension);
            let item = ContentItem::from_text(&relative_path, &output)
                .with_pivots(variant.pivots.clone())
                .with_hash(hash);
            item.write_to_destination(destination)?;
            section.add_result(&item, HASHED_CATEGORY, true)?;
            debug!(section = %id, output = %relative_path, pivots = %variant.pivots, "wrote output");

            records.push(OutputRecord {
                inputs: input_paths.clone(),
                output: relative_path,
                hash,
                pivots: variant.pivots,
            });
        }

        Ok(if warnings.is_empty() {
            WorkOutcome::Completed
        } else {
            WorkOutcome::CompletedWithWarnings(warnings)
        })
    })?;

    if run.state() == SectionState::Skipped {
        records = cached_records(&mut run.section, &input_paths, ctx.hasher())?;
    }

    Ok(FileSetRun {
        report: FileSetReport {
            name: set.name.clone(),
            state: Some(run.state()),
            outcome: run.outcome.clone(),
        },
        records,
        run: Some(run),
    })
}

/// The extension of an output name, without the dot.
fn output_extension(output: &str) -> Option<&str> {
    if output.trim().is_empty() {
        return None;
    }
    Path::new(output)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
}

fn cached_records(
    section: &mut CacheSection,
    inputs: &[String],
    hasher: &ContentHasher,
) -> Result<Vec<OutputRecord>, PipelineError> {
    section
        .cached_content_items(HASHED_CATEGORY, true)
        .into_iter()
        .map(|item| {
            Ok(OutputRecord {
                inputs: inputs.to_vec(),
                output: item.relative_path().to_string(),
                hash: item.content_hash(hasher)?,
                pivots: item.pivots().clone(),
            })
        })
        .collect()
}

/// Locale and theme values of a file set and the files they came from.
struct PivotResources {
    locales: Vec<(String, Resources)>,
    themes: Vec<(String, Resources)>,
    items: Vec<ContentItem>,
}

impl PivotResources {
    fn load(ctx: &BuildContext, set: &FileSetConfig) -> Result<Self, WorkIssue> {
        let paths = ctx.paths();
        let mut items = Vec::new();
        let mut read = |dir: &Path, kind: &str, names: &[String]| {
            names
                .iter()
                .map(|name| -> Result<(String, Resources), WorkIssue> {
                    let path = dir.join(format!("{name}.json"));
                    let values = load_resources(&path)?;
                    items.push(ContentItem::from_file(&format!("{kind}/{name}.json"), path));
                    Ok((name.clone(), values))
                })
                .collect::<Result<Vec<_>, WorkIssue>>()
        };
        let locales = read(paths.locales.as_path(), "locales", &set.locales)?;
        let themes = read(paths.themes.as_path(), "themes", &set.themes)?;
        Ok(Self {
            locales,
            themes,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extension_rules() {
        assert_eq!(output_extension("site.css"), Some("css"));
        assert_eq!(output_extension("bundles/app.min.js"), Some("js"));
        assert_eq!(output_extension("site"), None);
        assert_eq!(output_extension(""), None);
        assert_eq!(output_extension("site."), None);
    }

    #[test]
    fn section_ids() {
        assert_eq!(section_id(FileType::StyleSheet, "site").to_string(), "CssFileSet.site");
        assert_eq!(section_id(FileType::JavaScript, "app").to_string(), "JsFileSet.app");
    }
}
