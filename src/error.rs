//! Error types for the corpus runner

use std::fmt;
use thiserror::Error;

/// Which engine binary a build targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildProfile {
    /// Unoptimized binary, built synchronously before a run
    Debug,
    /// Optimized binary, built in the background for large runs
    Release,
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildProfile::Debug => write!(f, "debug"),
            BuildProfile::Release => write!(f, "release"),
        }
    }
}

/// Main error type for the corpus runner
///
/// Per-test execution problems never show up here: they are recorded as
/// `RUNNER_ERROR` results and flow through aggregation like any other result.
/// Only lookups and whole-run setup failures are errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A directory lookup on a tree that never saw that directory
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// A point lookup on a test path the tree does not contain
    #[error("test not found: {0}")]
    TestNotFound(String),

    /// A status string that is not one of the known statuses
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// An engine build failed
    #[error("{profile} build failed: {message}")]
    Build {
        profile: BuildProfile,
        message: String,
    },

    /// Work abandoned through its cancel token
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An operation that exists in the API but is intentionally not provided
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// A results snapshot could not be decoded
    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    /// A remote snapshot could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Pipeline bookkeeping failed (a worker thread died, a queue closed early)
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Corpus enumeration failed
    #[error("failed to walk corpus: {source}")]
    Walk {
        #[from]
        source: walkdir::Error,
    },

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a directory lookup error
    pub fn directory_not_found(dir: impl Into<String>) -> Self {
        Error::DirectoryNotFound(dir.into())
    }

    /// Create a test lookup error
    pub fn test_not_found(path: impl Into<String>) -> Self {
        Error::TestNotFound(path.into())
    }

    /// Create a build error for the given profile
    pub fn build(profile: BuildProfile, message: impl Into<String>) -> Self {
        Error::Build {
            profile,
            message: message.into(),
        }
    }

    /// Whether this is a lookup error (missing path or directory)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DirectoryNotFound(_) | Error::TestNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Snapshot(e.to_string())
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        Error::Fetch(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias for corpus runner operations
pub type Result<T> = std::result::Result<T, Error>;
