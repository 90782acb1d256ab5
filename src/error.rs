//! Error types for numascope
//!
//! Only a missing prerequisite aborts a run. Everything else raised here is
//! caught by the fact collector and turned into an "unavailable" marker.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for numascope operations
#[derive(Error, Debug)]
pub enum NumaScopeError {
    /// One or more mandatory inspection tools are not installed
    #[error("prerequisite not installed: {}", .tools.join(", "))]
    MissingPrerequisite {
        /// Every missing tool, in the order they were checked
        tools: Vec<String>,
    },

    /// I/O error while reading a sysfs/procfs file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External tool could not be spawned or exited unsuccessfully
    #[error("command '{program}' failed: {message}")]
    CommandFailed { program: String, message: String },

    /// Tool or file output did not have the expected shape
    #[error("could not parse {what}: {message}")]
    Parse { what: String, message: String },

    /// A source answered but had nothing to report
    #[error("{0} reported nothing")]
    Empty(String),

    /// NUMA distance table violates square/symmetric invariants
    #[error("invalid NUMA distance table: {0}")]
    InvalidTopology(String),

    /// Platform does not expose this fact
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    /// Writing the report failed
    #[error("failed to write report: {0}")]
    Output(#[source] std::io::Error),
}

impl NumaScopeError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a command failure
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Create an empty-output error
    pub fn empty(what: impl Into<String>) -> Self {
        Self::Empty(what.into())
    }
}

/// Result type alias for numascope operations
pub type Result<T> = std::result::Result<T, NumaScopeError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| NumaScopeError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_prerequisite_names_every_tool() {
        let err = NumaScopeError::MissingPrerequisite {
            tools: vec!["lscpu".to_string(), "numactl".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("prerequisite not installed"));
        assert!(message.contains("lscpu"));
        assert!(message.contains("numactl"));
    }

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let result: std::io::Result<()> = Err(io_err);
        let err = result.with_path("/proc/sys/vm/swappiness").unwrap_err();
        match err {
            NumaScopeError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("/proc/sys/vm/swappiness"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
