//! Configuration types deserialized from `grist.toml`.

use grist_common::FileType;
use serde::{Deserialize, Serialize};

/// The top-level build configuration parsed from `grist.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Source, destination and log directories.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Cache behavior.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Locale and theme resource locations.
    #[serde(default)]
    pub resources: ResourcesConfig,
    /// Style sheet file sets.
    #[serde(default)]
    pub css: Vec<FileSetConfig>,
    /// JavaScript file sets.
    #[serde(default)]
    pub js: Vec<FileSetConfig>,
    /// Image inputs.
    #[serde(default)]
    pub images: ImagesConfig,
}

impl BuildConfig {
    /// The file sets configured for a file type. Images have none.
    pub fn file_sets(&self, file_type: FileType) -> &[FileSetConfig] {
        match file_type {
            FileType::StyleSheet => &self.css,
            FileType::JavaScript => &self.js,
            FileType::Image => &[],
        }
    }
}

/// Core project metadata required in every `grist.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: String,
    /// Build flavor, e.g. `Debug` or `Release`. Part of every fingerprint.
    #[serde(default = "default_config_type")]
    pub config_type: String,
}

fn default_config_type() -> String {
    "Release".to_string()
}

/// Directory layout, relative to the project directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Root of the input files.
    #[serde(default = "default_source")]
    pub source: String,
    /// Root the outputs are written to.
    #[serde(default = "default_destination")]
    pub destination: String,
    /// Directory the output logs are written to.
    #[serde(default = "default_logs")]
    pub logs: String,
}

fn default_source() -> String {
    ".".to_string()
}

fn default_destination() -> String {
    "out".to_string()
}

fn default_logs() -> String {
    "out/statics".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
            logs: default_logs(),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Whether sections are persisted and reused.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache root, relative to the project directory.
    #[serde(default = "default_cache_root")]
    pub root: String,
    /// Delete the cache root before building.
    #[serde(default)]
    pub clean: bool,
    /// Delete the destination and log directories before building.
    #[serde(default)]
    pub clean_destination: bool,
    /// Record and report per-section timings.
    #[serde(default)]
    pub measure: bool,
}

fn default_true() -> bool {
    true
}

fn default_cache_root() -> String {
    ".grist-cache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_cache_root(),
            clean: false,
            clean_destination: false,
            measure: false,
        }
    }
}

/// Where locale and theme resource files live, relative to the source root.
///
/// Each locale `<name>` is read from `<locales>/<name>.json` and each theme
/// from `<themes>/<name>.json`; both are flat string maps of token values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourcesConfig {
    /// Locale resource directory.
    #[serde(default = "default_locales")]
    pub locales: String,
    /// Theme resource directory.
    #[serde(default = "default_themes")]
    pub themes: String,
}

fn default_locales() -> String {
    "resources/locales".to_string()
}

fn default_themes() -> String {
    "resources/themes".to_string()
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            locales: default_locales(),
            themes: default_themes(),
        }
    }
}

/// A named group of inputs bundled into one output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileSetConfig {
    /// Unique name within its file type.
    pub name: String,
    /// Input files or glob patterns, relative to the source root, in bundle
    /// order.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output file name. File sets without a usable output are skipped.
    #[serde(default)]
    pub output: String,
    /// Locales to produce. Empty means one unlocalized output.
    #[serde(default)]
    pub locales: Vec<String>,
    /// Themes to produce. Empty means one unthemed output.
    #[serde(default)]
    pub themes: Vec<String>,
}

/// Image inputs that are copied to content-hashed names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImagesConfig {
    /// Image files or glob patterns, relative to the source root.
    #[serde(default)]
    pub inputs: Vec<String>,
}
