//! Output logs: which inputs produced which hashed output.
//!
//! One log is kept per [`FileType`] as `<log_dir>/<type>_log.json`. Downstream
//! tools use it to map a source path to the content-hashed file that replaced
//! it.

use std::path::{Path, PathBuf};

use grist_common::{ContentHash, FileType, PivotSet};
use serde::{Deserialize, Serialize};

use crate::content_item::normalize_relative_path;
use crate::error::CacheError;

/// One output and the inputs it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Input paths, relative to the source root.
    pub inputs: Vec<String>,
    /// Output path, relative to the destination root.
    pub output: String,
    /// Content hash of the output.
    pub hash: ContentHash,
    /// Pivots the output was produced for.
    #[serde(default, skip_serializing_if = "PivotSet::is_empty")]
    pub pivots: PivotSet,
}

/// The output log of one file type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLog {
    /// File type the log covers.
    pub file_type: FileType,
    /// Records in the order they were added.
    pub records: Vec<OutputRecord>,
}

impl OutputLog {
    /// Creates an empty log.
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            records: Vec::new(),
        }
    }

    /// Path of the log file for `file_type` inside `log_dir`.
    pub fn path(log_dir: &Path, file_type: FileType) -> PathBuf {
        log_dir.join(format!("{file_type}_log.json"))
    }

    /// Adds a record. When a record for the same output and pivots exists,
    /// the new inputs are appended to it and its hash is updated.
    pub fn record<I, S>(&mut self, inputs: I, output: &str, hash: ContentHash, pivots: PivotSet)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let output = normalize_relative_path(output);
        let inputs = inputs
            .into_iter()
            .map(|i| normalize_relative_path(i.as_ref()));
        match self
            .records
            .iter_mut()
            .find(|r| r.output == output && r.pivots == pivots)
        {
            Some(existing) => {
                for input in inputs {
                    if !existing.inputs.contains(&input) {
                        existing.inputs.push(input);
                    }
                }
                existing.hash = hash;
            }
            None => self.records.push(OutputRecord {
                inputs: inputs.collect(),
                output,
                hash,
                pivots,
            }),
        }
    }

    /// Finds the first record listing `input`, ignoring case and separator
    /// style.
    pub fn find_output(&self, input: &str) -> Option<&OutputRecord> {
        let wanted = normalize_relative_path(input).to_lowercase();
        self.records
            .iter()
            .find(|r| r.inputs.iter().any(|i| i.to_lowercase() == wanted))
    }

    /// Appends the records of `other`, merging inputs of records for the same
    /// output.
    pub fn merge(&mut self, other: OutputLog) {
        for r in other.records {
            self.record(r.inputs, &r.output, r.hash, r.pivots);
        }
    }

    /// Serializes the log as pretty JSON.
    pub fn to_json(&self) -> Result<String, CacheError> {
        serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Parses a log from JSON.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        serde_json::from_str(json).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Loads the log of `file_type` from `log_dir`.
    ///
    /// Returns `None` if the file doesn't exist or can't be parsed.
    pub fn load(log_dir: &Path, file_type: FileType) -> Option<Self> {
        let content = std::fs::read_to_string(Self::path(log_dir, file_type)).ok()?;
        Self::from_json(&content).ok()
    }

    /// Saves the log as pretty JSON, creating `log_dir` if needed.
    pub fn save(&self, log_dir: &Path) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(log_dir).map_err(CacheError::io(log_dir))?;
        let path = Self::path(log_dir, self.file_type);
        std::fs::write(&path, self.to_json()?).map_err(CacheError::io(&path))?;
        Ok(path)
    }
}

/// Content-hashed output path: `<prefix>/<h[0..2]>/<h[2..]>.<ext>`.
///
/// An empty prefix or extension is omitted along with its separator.
pub fn hashed_output_path(prefix: &str, hash: &ContentHash, extension: &str) -> String {
    let hex = hash.to_hex();
    let (dir, rest) = hex.split_at(2);
    let extension = extension.trim_start_matches('.');
    let mut path = String::new();
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        path.push_str(prefix);
        path.push('/');
    }
    path.push_str(dir);
    path.push('/');
    path.push_str(rest);
    if !extension.is_empty() {
        path.push('.');
        path.push_str(extension);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(s: &str) -> ContentHash {
        ContentHash::from_bytes(s.as_bytes())
    }

    #[test]
    fn hashed_path_layout() {
        let h = hash("abc");
        assert_eq!(
            hashed_output_path("i", &h, "png"),
            "i/ba/7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.png"
        );
        assert_eq!(
            hashed_output_path("", &h, ".css"),
            "ba/7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.css"
        );
        assert!(hashed_output_path("js/", &h, "").starts_with("js/ba/"));
        assert!(!hashed_output_path("js", &h, "").ends_with('.'));
    }

    #[test]
    fn find_output_ignores_case_and_separators() {
        let mut log = OutputLog::new(FileType::Image);
        log.record(["images\\Logo.PNG"], "i/ab/cdef.png", hash("x"), PivotSet::new());
        let found = log.find_output("IMAGES/logo.png").unwrap();
        assert_eq!(found.output, "i/ab/cdef.png");
        assert!(log.find_output("images/other.png").is_none());
    }

    #[test]
    fn record_merges_inputs_of_same_output() {
        let mut log = OutputLog::new(FileType::Image);
        log.record(["images/a.png"], "i/ab/cd.png", hash("1"), PivotSet::new());
        log.record(
            ["images\\b.png", "images/a.png"],
            "i/ab/cd.png",
            hash("1"),
            PivotSet::new(),
        );
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].inputs, ["images/a.png", "images/b.png"]);
        assert_eq!(log.find_output("images/a.png").unwrap().output, "i/ab/cd.png");
        assert_eq!(log.find_output("images/b.png").unwrap().output, "i/ab/cd.png");

        log.record(["images/a.png"], "i/ab/cd.png", hash("2"), PivotSet::new());
        assert_eq!(log.records[0].hash, hash("2"));
        assert_eq!(log.records[0].inputs.len(), 2);

        let fr = PivotSet::new().with(PivotSet::LOCALE, "fr-fr");
        log.record(["images/a.png"], "i/ab/cd.png", hash("3"), fr);
        assert_eq!(log.records.len(), 2);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = OutputLog::new(FileType::JavaScript);
        log.record(["app.js"], "js/aa/bb.js", hash("app"), PivotSet::new());
        let path = log.save(&dir.path().join("logs")).unwrap();
        assert!(path.ends_with("js_log.json"));

        let back = OutputLog::load(&dir.path().join("logs"), FileType::JavaScript).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn load_missing_or_corrupt_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(OutputLog::load(dir.path(), FileType::StyleSheet).is_none());
        std::fs::write(OutputLog::path(dir.path(), FileType::StyleSheet), "{").unwrap();
        assert!(OutputLog::load(dir.path(), FileType::StyleSheet).is_none());
    }

    #[test]
    fn merge_appends_and_combines() {
        let mut a = OutputLog::new(FileType::JavaScript);
        a.record(["x.js"], "js/x.js", hash("1"), PivotSet::new());
        let mut b = OutputLog::new(FileType::JavaScript);
        b.record(["w.js"], "js/x.js", hash("2"), PivotSet::new());
        b.record(["y.js"], "js/y.js", hash("3"), PivotSet::new());
        a.merge(b);
        assert_eq!(a.records.len(), 2);
        assert_eq!(a.records[0].inputs, ["x.js", "w.js"]);
        assert_eq!(a.find_output("x.js").unwrap().hash, hash("2"));
        assert_eq!(a.find_output("w.js").unwrap().output, "js/x.js");
    }
}
