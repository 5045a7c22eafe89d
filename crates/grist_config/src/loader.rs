//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{BuildConfig, FileSetConfig};
use std::collections::HashSet;
use std::path::Path;

/// Name of the configuration file within a project directory.
pub const CONFIG_FILE: &str = "grist.toml";

/// Loads and validates a `grist.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<BuildConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a `grist.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<BuildConfig, ConfigError> {
    let config: BuildConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and configuration values are consistent.
fn validate_config(config: &BuildConfig) -> Result<(), ConfigError> {
    if config.project.name.trim().is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.cache.enabled && config.cache.root.trim().is_empty() {
        return Err(ConfigError::MissingField("cache.root".to_string()));
    }
    if config.paths.destination.trim().is_empty() {
        return Err(ConfigError::MissingField("paths.destination".to_string()));
    }
    validate_file_sets("css", &config.css)?;
    validate_file_sets("js", &config.js)?;
    Ok(())
}

fn validate_file_sets(kind: &str, sets: &[FileSetConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (i, set) in sets.iter().enumerate() {
        if set.name.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("{kind}[{i}].name")));
        }
        if !seen.insert(set.name.to_lowercase()) {
            return Err(ConfigError::DuplicateFileSet {
                kind: kind.to_string(),
                name: set.name.clone(),
            });
        }
        if let Some(bad) = set
            .locales
            .iter()
            .chain(&set.themes)
            .find(|v| v.trim().is_empty() || v.contains(['/', '\\']))
        {
            return Err(ConfigError::InvalidPivotName {
                kind: kind.to_string(),
                file_set: set.name.clone(),
                value: bad.clone(),
            });
        }
    }
    Ok(())
}
