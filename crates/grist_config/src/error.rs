//! Configuration errors.

use std::path::PathBuf;

/// Why a `grist.toml` could not be turned into a usable build configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file or project directory could not be accessed.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File or directory that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Two file sets of one file type share a name, ignoring case.
    #[error("duplicate {kind} file set '{name}'")]
    DuplicateFileSet {
        /// `css` or `js`.
        kind: String,
        /// The repeated name, as written second.
        name: String,
    },

    /// A locale or theme name that cannot name a resource file.
    #[error("{kind} file set '{file_set}' has an invalid locale or theme name '{value}'")]
    InvalidPivotName {
        /// `css` or `js`.
        kind: String,
        /// File set declaring the name.
        file_set: String,
        /// The offending name.
        value: String,
    },

    /// Cleaning the cache root would delete outputs, or the other way round.
    #[error("cache root '{cache_root}' overlaps destination '{destination}'")]
    CacheOverlapsDestination {
        /// Configured cache root.
        cache_root: String,
        /// Configured destination.
        destination: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_read() {
        let err = ConfigError::Read {
            path: PathBuf::from("site/grist.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.to_string(), "cannot read site/grist.toml: no such file");
    }

    #[test]
    fn display_duplicate() {
        let err = ConfigError::DuplicateFileSet {
            kind: "css".into(),
            name: "Site".into(),
        };
        assert_eq!(err.to_string(), "duplicate css file set 'Site'");
    }

    #[test]
    fn display_overlap() {
        let err = ConfigError::CacheOverlapsDestination {
            cache_root: "out/cache".into(),
            destination: "out".into(),
        };
        assert_eq!(
            err.to_string(),
            "cache root 'out/cache' overlaps destination 'out'"
        );
    }
}
