//! Error types for cache operations.

use std::path::{Path, PathBuf};

/// Errors that can occur during cache operations.
///
/// Reads from the store are fail-safe: most problems there degrade to a cache
/// miss rather than surfacing as an error. This enum is returned where a
/// failure means the caller cannot continue, such as an input that cannot be
/// hashed or a save that cannot be written.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading or writing a cache, input or destination file failed.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A section manifest could not be parsed as valid JSON.
    #[error("failed to parse section manifest: {reason}")]
    ManifestParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// A section file has an invalid or missing header.
    #[error("invalid section header in {path}: {reason}")]
    InvalidHeader {
        /// The section file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// A section payload was truncated or modified after it was written.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The section file path.
        path: PathBuf,
        /// Checksum recorded in the header.
        expected: String,
        /// Checksum of the payload as read.
        actual: String,
    },

    /// The section was written in another file format.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The section file path.
        path: PathBuf,
        /// Format this build reads.
        expected: u32,
        /// Format recorded in the file.
        actual: u32,
    },

    /// A serialization or deserialization error occurred, including vary-by
    /// settings that cannot be represented canonically.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A directory dependency pattern is not a valid glob.
    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Description of the problem.
        reason: String,
    },

    /// An advisory lock on a fingerprint could not be acquired.
    #[error("failed to lock {path}: {source}")]
    Lock {
        /// The lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An operation was called in a section state that does not allow it.
    #[error("section '{section}' cannot {operation}: {reason}")]
    SectionState {
        /// The section identifier.
        section: String,
        /// The attempted operation.
        operation: &'static str,
        /// Why the operation was rejected.
        reason: &'static str,
    },
}

impl CacheError {
    /// Returns a closure that wraps an I/O error with the given path.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
        let path = path.to_path_buf();
        move |source| CacheError::Io { path, source }
    }

    /// Returns `true` if this is an I/O error for a file that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/cache/sections/ab/abcd.section"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("abcd.section"));
        assert!(err.is_not_found());
    }

    #[test]
    fn manifest_parse_display() {
        let err = CacheError::ManifestParse {
            reason: "unexpected EOF".to_string(),
        };
        assert!(err.to_string().contains("unexpected EOF"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn invalid_header_display() {
        let err = CacheError::InvalidHeader {
            path: PathBuf::from("bad.section"),
            reason: "missing magic bytes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid section header"));
        assert!(msg.contains("missing magic bytes"));
    }

    #[test]
    fn checksum_mismatch_display() {
        let err = CacheError::ChecksumMismatch {
            path: PathBuf::from("file.section"),
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = CacheError::VersionMismatch {
            path: PathBuf::from("old.section"),
            expected: 2,
            actual: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("got 1"));
    }

    #[test]
    fn section_state_display() {
        let err = CacheError::SectionState {
            section: "Everything.Css".to_string(),
            operation: "add a result",
            reason: "the section has already ended",
        };
        assert_eq!(
            err.to_string(),
            "section 'Everything.Css' cannot add a result: the section has already ended"
        );
    }

    #[test]
    fn io_helper_wraps_path() {
        let path = PathBuf::from("x/y.css");
        let err = CacheError::io(&path)(std::io::Error::other("boom"));
        match err {
            CacheError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected Io, got {other:?}"),
        }
    }
}
