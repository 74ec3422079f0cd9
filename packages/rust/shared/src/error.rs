//! Error types for nsxconv.
//!
//! Library crates use [`ConvertError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all nsxconv operations.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The input file is not a readable export archive.
    #[error("archive {path:?} is unreadable: {message}")]
    ArchiveUnreadable { path: PathBuf, message: String },

    /// A single notebook/note record could not be read or decoded.
    #[error("record {id} is unreadable: {message}")]
    Record { id: String, message: String },

    /// No input archives were given or discovered.
    #[error("no .nsx archives found in {dir:?}")]
    NoArchives { dir: PathBuf },

    /// The external markup converter could not be located.
    #[error("markup converter `{program}` not found: {message}")]
    ConverterMissing { program: String, message: String },

    /// The external converter ran past its time budget.
    #[error("markup converter timed out after {secs}s")]
    ConverterTimeout { secs: u64 },

    /// HTML-to-markup conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Reverse geocoding error.
    #[error("geocoding error: {0}")]
    Geocode(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an archive-unreadable error for the given path.
    pub fn archive(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::ArchiveUnreadable {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a record error for the given record identifier.
    pub fn record(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Record {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run rather than one archive or note.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConverterMissing { .. } | Self::NoArchives { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ConvertError::config("unknown target");
        assert_eq!(err.to_string(), "config error: unknown target");

        let err = ConvertError::record("note_1", "missing field `md5`");
        assert!(err.to_string().contains("note_1"));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn fatal_classification() {
        assert!(
            ConvertError::ConverterMissing {
                program: "pandoc".into(),
                message: "not found".into(),
            }
            .is_fatal()
        );
        assert!(ConvertError::NoArchives { dir: ".".into() }.is_fatal());
        assert!(!ConvertError::ConverterTimeout { secs: 20 }.is_fatal());
        assert!(!ConvertError::archive("a.nsx", "bad zip").is_fatal());
    }
}
