//! Locating and loading the project configuration.

use std::path::{Path, PathBuf};

use grist_config::{load_config, load_config_from_str, BuildConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `grist.toml`.
///
/// Returns the directory containing `grist.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Loads the project configuration selected by the global args.
///
/// `--config` may name a configuration file, whose directory becomes the
/// project directory, or a project directory. Without it the nearest
/// `grist.toml` above the current directory is used.
pub fn load_project(
    global: &GlobalArgs,
) -> Result<(PathBuf, BuildConfig), Box<dyn std::error::Error>> {
    match global.config.as_deref().map(PathBuf::from) {
        Some(path) if path.is_file() => {
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            let content = std::fs::read_to_string(&path)?;
            Ok((dir, load_config_from_str(&content)?))
        }
        Some(dir) => {
            let config = load_config(&dir)?;
            Ok((dir, config))
        }
        None => {
            let dir = find_project_root(&std::env::current_dir()?)?;
            let config = load_config(&dir)?;
            Ok((dir, config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(config: Option<String>) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config,
        }
    }

    #[test]
    fn finds_root_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[project]\nname = \"x\"\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_root(&nested).unwrap(), dir.path());
    }

    #[test]
    fn missing_root_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_project_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains("could not find grist.toml"));
    }

    #[test]
    fn config_file_or_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(&file, "[project]\nname = \"custom\"\n").unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[project]\nname = \"default\"\n").unwrap();

        let (root, config) = load_project(&global(Some(file.display().to_string()))).unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(config.project.name, "custom");

        let (_, config) = load_project(&global(Some(dir.path().display().to_string()))).unwrap();
        assert_eq!(config.project.name, "default");
    }
}
