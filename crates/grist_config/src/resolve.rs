//! Path resolution: turning the relative paths of a config into absolute ones.

use crate::error::ConfigError;
use crate::types::BuildConfig;
use std::path::{Path, PathBuf};

/// The directories of a build, resolved against the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Root of the input files.
    pub source: PathBuf,
    /// Root the outputs are written to.
    pub destination: PathBuf,
    /// Directory the output logs are written to.
    pub logs: PathBuf,
    /// Cache root.
    pub cache_root: PathBuf,
    /// Locale resource directory.
    pub locales: PathBuf,
    /// Theme resource directory.
    pub themes: PathBuf,
}

/// Resolves every configured directory against `project_dir`.
///
/// Absolute paths in the config are kept as-is. Resource directories are
/// relative to the source root. The cache root may not overlap the
/// destination, since cleaning one would destroy the other.
pub fn resolve_paths(config: &BuildConfig, project_dir: &Path) -> Result<ResolvedPaths, ConfigError> {
    let project_dir = std::path::absolute(project_dir).map_err(|source| ConfigError::Read {
        path: project_dir.to_path_buf(),
        source,
    })?;
    let source = project_dir.join(&config.paths.source);
    let destination = project_dir.join(&config.paths.destination);
    let cache_root = project_dir.join(&config.cache.root);

    if config.cache.enabled
        && (cache_root.starts_with(&destination) || destination.starts_with(&cache_root))
    {
        return Err(ConfigError::CacheOverlapsDestination {
            cache_root: config.cache.root.clone(),
            destination: config.paths.destination.clone(),
        });
    }

    Ok(ResolvedPaths {
        logs: project_dir.join(&config.paths.logs),
        locales: source.join(&config.resources.locales),
        themes: source.join(&config.resources.themes),
        source,
        destination,
        cache_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn resolves_relative_to_project() {
        let config = load_config_from_str(
            r#"
[project]
name = "site"

[paths]
source = "content"
"#,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let paths = resolve_paths(&config, dir.path()).unwrap();
        let root = std::path::absolute(dir.path()).unwrap();
        assert_eq!(paths.source, root.join("content"));
        assert_eq!(paths.destination, root.join("out"));
        assert_eq!(paths.logs, root.join("out/statics"));
        assert_eq!(paths.cache_root, root.join(".grist-cache"));
        assert_eq!(paths.locales, root.join("content/resources/locales"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("elsewhere");
        let toml = format!(
            "[project]\nname = \"site\"\n[paths]\ndestination = {:?}\n",
            dest.to_string_lossy()
        );
        let config = load_config_from_str(&toml).unwrap();
        let paths = resolve_paths(&config, Path::new("/some/project")).unwrap();
        assert_eq!(paths.destination, dest);
    }

    #[test]
    fn cache_inside_destination_errors() {
        let config = load_config_from_str(
            r#"
[project]
name = "site"

[cache]
root = "out/cache"
"#,
        )
        .unwrap();
        let err = resolve_paths(&config, Path::new("/p")).unwrap_err();
        assert!(matches!(err, ConfigError::CacheOverlapsDestination { .. }));
    }

    #[test]
    fn overlap_allowed_when_cache_disabled() {
        let config = load_config_from_str(
            r#"
[project]
name = "site"

[cache]
enabled = false
root = "out"
"#,
        )
        .unwrap();
        assert!(resolve_paths(&config, Path::new("/p")).is_ok());
    }
}
