//! Output file types handled by the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of asset an output belongs to.
///
/// Each file type gets its own output log (`css_log.json`, `js_log.json`,
/// `images_log.json`) and its own top-level pipeline section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// Cascading style sheets.
    #[serde(rename = "css")]
    StyleSheet,
    /// JavaScript sources.
    #[serde(rename = "js")]
    JavaScript,
    /// Binary image assets.
    #[serde(rename = "images")]
    Image,
}

impl FileType {
    /// All file types in pipeline order.
    pub const ALL: [FileType; 3] = [FileType::JavaScript, FileType::StyleSheet, FileType::Image];

    /// Short lowercase name, used for log file names and output prefixes.
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::StyleSheet => "css",
            FileType::JavaScript => "js",
            FileType::Image => "images",
        }
    }

    /// Section name fragment, e.g. `CssFileSet`.
    pub fn section_name(self) -> &'static str {
        match self {
            FileType::StyleSheet => "Css",
            FileType::JavaScript => "Js",
            FileType::Image => "Images",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown file type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file type '{0}' (expected css, js or images)")]
pub struct ParseFileTypeError(pub String);

impl FromStr for FileType {
    type Err = ParseFileTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "css" | "stylesheet" => Ok(FileType::StyleSheet),
            "js" | "javascript" => Ok(FileType::JavaScript),
            "images" | "image" | "img" => Ok(FileType::Image),
            _ => Err(ParseFileTypeError(s.to_string())),
        }
    }
}
