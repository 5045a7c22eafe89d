//! Resolving configured input entries to files.
//!
//! An entry is either a path relative to the source root or a glob. Globs are
//! split at their first wildcard component: the literal prefix names the
//! directory that is watched and the remainder is matched below it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use grist_cache::content_item::normalize_relative_path;
use grist_cache::dependency::compile_pattern;
use grist_cache::ContentItem;
use grist_common::{IssueCode, WorkIssue};

use crate::context::BuildContext;
use crate::error::PipelineError;

/// An input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Path relative to the source root, `/`-separated.
    pub relative_path: String,
    /// Path on disk.
    pub path: PathBuf,
}

impl InputFile {
    /// A file-backed content item for this input.
    pub fn content_item(&self) -> ContentItem {
        ContentItem::from_file(&self.relative_path, &self.path)
    }
}

/// A wildcard entry, as a directory and a pattern relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobInput {
    /// Directory the pattern is matched below.
    pub dir: PathBuf,
    /// Pattern relative to `dir`.
    pub pattern: String,
    /// Whether the pattern reaches into subdirectories.
    pub recursive: bool,
}

/// The files a list of entries resolved to.
#[derive(Debug, Default)]
pub struct ResolvedInputs {
    /// Matching files in entry order. Each file appears once.
    pub files: Vec<InputFile>,
    /// Wildcard entries, to be recorded as directory dependencies.
    pub globs: Vec<GlobInput>,
    /// Literal entries that do not exist.
    pub missing: Vec<WorkIssue>,
}

/// Returns `true` if `entry` contains glob syntax.
pub fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '[', '{'])
}

/// Splits a glob into its literal directory prefix and the pattern below it.
///
/// `css/**/*.css` becomes `("css", "**/*.css")`; `*.js` becomes `("", "*.js")`.
pub fn split_glob(entry: &str) -> (String, String) {
    let entry = normalize_relative_path(entry);
    let parts: Vec<&str> = entry.split('/').collect();
    let first_wild = parts.iter().position(|p| is_glob(p)).unwrap_or(parts.len());
    let prefix = parts[..first_wild].join("/");
    let rest = parts[first_wild..].join("/");
    (prefix, rest)
}

/// Returns `true` if `pattern` can match below its first directory level.
pub fn is_recursive(pattern: &str) -> bool {
    pattern.contains('/') || pattern.contains("**")
}

/// Resolves input entries against the source files of `ctx`.
pub fn resolve_inputs(
    ctx: &BuildContext,
    entries: &[String],
) -> Result<ResolvedInputs, PipelineError> {
    let source = &ctx.paths().source;
    let mut resolved = ResolvedInputs::default();
    let mut seen = HashSet::new();

    for entry in entries {
        if !is_glob(entry) {
            let relative_path = normalize_relative_path(entry);
            let path = source.join(&relative_path);
            if !path.is_file() {
                resolved.missing.push(WorkIssue::new(
                    IssueCode::MissingInput,
                    format!("input '{relative_path}' does not exist"),
                ));
                continue;
            }
            if seen.insert(relative_path.clone()) {
                resolved.files.push(InputFile {
                    relative_path,
                    path,
                });
            }
            continue;
        }

        let (prefix, pattern) = split_glob(entry);
        let matcher = compile_pattern(&pattern)?;
        let recursive = is_recursive(&pattern);
        for (rel, path) in ctx.available_files()? {
            let Some(below) = strip_dir(rel, &prefix) else {
                continue;
            };
            if !recursive && below.contains('/') {
                continue;
            }
            let name = below.rsplit('/').next().unwrap_or(below);
            if (matcher.is_match(below) || matcher.is_match(name)) && seen.insert(rel.clone()) {
                resolved.files.push(InputFile {
                    relative_path: rel.clone(),
                    path: path.clone(),
                });
            }
        }
        resolved.globs.push(GlobInput {
            dir: source.join(&prefix),
            pattern,
            recursive,
        });
    }
    Ok(resolved)
}

fn strip_dir<'a>(rel: &'a str, dir: &str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(rel);
    }
    rel.strip_prefix(dir)?.strip_prefix('/')
}

/// Resolves `target` relative to the directory of `from`.
pub fn relative_to(from: &Path, target: &str) -> PathBuf {
    let base = from.parent().unwrap_or(Path::new(""));
    base.join(normalize_relative_path(target))
}
