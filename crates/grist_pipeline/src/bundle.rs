//! Bundling: concatenating inputs and expanding include directives.
//!
//! A line consisting of `/* @include path */` or `// @include path` is
//! replaced by the content of `path`, resolved relative to the including
//! file. A path with wildcards includes every matching file in name order.
//! Included files and wildcard directories are recorded as dependencies of
//! the bundle section, so editing an included file invalidates it even
//! though it is not a configured input.

use std::path::{Path, PathBuf};

use grist_cache::dependency::{compile_pattern, list_matching_files};
use grist_cache::{CacheSection, ContentItem, VaryBy};
use grist_common::{FileType, IssueCode, SectionId, WorkIssue, WorkOutcome};
use tracing::debug;

use crate::context::{BuildContext, SectionRun};
use crate::error::PipelineError;
use crate::inputs::{is_glob, is_recursive, relative_to, split_glob, InputFile};

/// Result category of the bundled content.
pub const BUNDLE_CATEGORY: &str = "bundle";

/// The bundle section and the bundled text, if the work completed.
#[derive(Debug)]
pub struct Bundled {
    /// The ended bundle section.
    pub run: SectionRun,
    /// The bundled text. `None` if bundling failed.
    pub text: Option<String>,
}

/// Runs the `Bundle` step of a file set as a child section of `parent_id`.
///
/// The section varies by the inputs only; a bundle whose includes are
/// unchanged is restored from the cache.
pub fn run_bundle(
    ctx: &BuildContext,
    parent_id: &SectionId,
    file_type: FileType,
    output_name: &str,
    inputs: &[InputFile],
) -> Result<Bundled, PipelineError> {
    let vary = VaryBy::new()
        .items(inputs.iter().map(InputFile::content_item))
        .setting("fileType", &file_type);

    let mut text = None;
    let run = ctx.run_section(parent_id.child("Bundle"), vary, false, |section| {
        if section.can_be_restored_from_cache() {
            if let Some(item) = section.cached_content_items(BUNDLE_CATEGORY, false).first() {
                text = Some(item.content_text()?);
                return Ok(WorkOutcome::Completed);
            }
        }

        let mut expansion = Expansion {
            excluded: ctx.generated_dirs().to_vec(),
            ..Expansion::default()
        };
        for input in inputs {
            if let Err(issue) = expansion.expand(&input.path) {
                return Ok(WorkOutcome::Failed(issue));
            }
        }
        record_dependencies(section, &expansion)?;

        let item = ContentItem::from_text(output_name, &expansion.text);
        section.add_result(&item, BUNDLE_CATEGORY, false)?;
        debug!(
            section = %section.id(),
            inputs = inputs.len(),
            includes = expansion.files.len(),
            "bundled"
        );
        text = Some(expansion.text);
        Ok(WorkOutcome::Completed)
    })?;

    Ok(Bundled { run, text })
}

fn record_dependencies(section: &mut CacheSection, expansion: &Expansion) -> Result<(), PipelineError> {
    for path in &expansion.files {
        section.add_source_dependency(path)?;
    }
    for (dir, pattern, recursive) in &expansion.dirs {
        section.add_directory_dependency(dir, pattern, *recursive, &expansion.excluded)?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Expansion {
    text: String,
    /// Included files, not counting the inputs themselves.
    files: Vec<PathBuf>,
    dirs: Vec<(PathBuf, String, bool)>,
    /// Directories wildcard includes do not reach into.
    excluded: Vec<PathBuf>,
    stack: Vec<PathBuf>,
}

impl Expansion {
    fn expand(&mut self, path: &Path) -> Result<(), WorkIssue> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.stack.contains(&key) {
            return Err(WorkIssue::new(
                IssueCode::IncludeCycle,
                format!("{} includes itself", path.display()),
            ));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkIssue::new(
                IssueCode::MissingInput,
                format!("cannot read {}: {e}", path.display()),
            )
        })?;

        self.stack.push(key);
        for line in content.lines() {
            match include_target(line) {
                Some(target) => self.include(path, target)?,
                None => {
                    self.text.push_str(line);
                    self.text.push('\n');
                }
            }
        }
        self.stack.pop();
        Ok(())
    }

    fn include(&mut self, from: &Path, target: &str) -> Result<(), WorkIssue> {
        if !is_glob(target) {
            let path = relative_to(from, target);
            self.expand(&path)?;
            if !self.files.contains(&path) {
                self.files.push(path);
            }
            return Ok(());
        }

        let (prefix, pattern) = split_glob(target);
        let dir = relative_to(from, &prefix);
        let recursive = is_recursive(&pattern);
        let invalid = |reason: String| {
            WorkIssue::new(
                IssueCode::MissingInput,
                format!("cannot include '{target}': {reason}"),
            )
        };
        compile_pattern(&pattern).map_err(|e| invalid(e.to_string()))?;
        let matches = list_matching_files(&dir, &pattern, recursive, &self.excluded)
            .map_err(|e| invalid(e.to_string()))?;
        for (_, path) in matches {
            self.expand(&path)?;
            if !self.files.contains(&path) {
                self.files.push(path);
            }
        }
        self.dirs.push((dir, pattern, recursive));
        Ok(())
    }
}

/// Extracts the path of an include directive line.
fn include_target(line: &str) -> Option<&str> {
    let line = line.trim();
    let body = if let Some(rest) = line.strip_prefix("/*") {
        rest.strip_suffix("*/")?
    } else {
        line.strip_prefix("//")?
    };
    let target = body.trim().strip_prefix("@include")?;
    if !target.starts_with(char::is_whitespace) {
        return None;
    }
    let target = target.trim().trim_matches(|c| c == '"' || c == '\'');
    (!target.is_empty()).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(root: &Path, input: &str) -> Result<Expansion, WorkIssue> {
        let mut e = Expansion::default();
        e.expand(&root.join(input))?;
        Ok(e)
    }

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn directive_forms() {
        assert_eq!(include_target("/* @include _vars.css */"), Some("_vars.css"));
        assert_eq!(include_target("  // @include \"lib/a.js\""), Some("lib/a.js"));
        assert_eq!(include_target("/*@include x.css*/"), Some("x.css"));
        assert_eq!(include_target("/* @included x */"), None);
        assert_eq!(include_target("// @include"), None);
        assert_eq!(include_target("a { b: c } /* @include x.css */"), None);
    }

    #[test]
    fn nested_includes_are_expanded_in_place() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "site.css", "/* @include parts/_a.css */\n.site{}\n");
        write(dir.path(), "parts/_a.css", "/* @include _b.css */\n.a{}\n");
        write(dir.path(), "parts/_b.css", ".b{}");

        let e = expand(dir.path(), "site.css").unwrap();
        assert_eq!(e.text, ".b{}\n.a{}\n.site{}\n");
        assert_eq!(e.files.len(), 2);
        assert!(e.dirs.is_empty());
    }

    #[test]
    fn wildcard_include_records_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.js", "// @include lib/*.js\nmain();\n");
        write(dir.path(), "lib/b.js", "b();");
        write(dir.path(), "lib/a.js", "a();");

        let e = expand(dir.path(), "app.js").unwrap();
        assert_eq!(e.text, "a();\nb();\nmain();\n");
        assert_eq!(e.dirs.len(), 1);
        assert_eq!(e.dirs[0].1, "*.js");
    }

    #[test]
    fn include_cycle_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.css", "/* @include b.css */");
        write(dir.path(), "b.css", "/* @include a.css */");
        let issue = expand(dir.path(), "a.css").unwrap_err();
        assert_eq!(issue.code, IssueCode::IncludeCycle);
    }

    #[test]
    fn missing_include_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.css", "/* @include nope.css */");
        let issue = expand(dir.path(), "a.css").unwrap_err();
        assert_eq!(issue.code, IssueCode::MissingInput);
    }

    #[test]
    fn same_file_may_be_included_twice() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.css", "/* @include _m.css */\n/* @include _m.css */");
        write(dir.path(), "_m.css", ".m{}");
        let e = expand(dir.path(), "a.css").unwrap();
        assert_eq!(e.text, ".m{}\n.m{}\n");
        assert_eq!(e.files.len(), 1);
    }
}
