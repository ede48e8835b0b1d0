//! Error types for noderun.
//!
//! Probe failures never show up here: a refused connection, a failed TLS
//! handshake or a malformed health document only mean "not ready yet" and
//! are retried by the enclosing poll loop.

use crate::readiness::ReadinessStage;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the noderun library.
#[derive(Debug, Error)]
pub enum NodeError {
    // Launch errors
    #[error("Failed to launch {executable}: {source}")]
    LaunchFailed {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid launch configuration: {message}")]
    Config { message: String },

    // Readiness errors
    #[error("Timed out after {timeout:?} waiting for {stage}")]
    Timeout {
        stage: ReadinessStage,
        timeout: Duration,
    },

    #[error("Output reader failed while the process was still running: {source}")]
    OutputReader {
        #[source]
        source: std::io::Error,
    },

    // Lifecycle errors
    #[error("Cannot {operation} while node is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Teardown incomplete: {}", failures.join("; "))]
    Teardown { failures: Vec<String> },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for noderun operations.
pub type Result<T> = std::result::Result<T, NodeError>;

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl NodeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NodeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        NodeError::Config {
            message: message.into(),
        }
    }

    /// Check if this error is a readiness timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_stage() {
        let err = NodeError::Timeout {
            stage: ReadinessStage::Health,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 30s waiting for cluster health"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_teardown_joins_failures() {
        let err = NodeError::Teardown {
            failures: vec!["remove /tmp/a: denied".into(), "remove /tmp/b: busy".into()],
        };
        assert_eq!(
            err.to_string(),
            "Teardown incomplete: remove /tmp/a: denied; remove /tmp/b: busy"
        );
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_io_with_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        match NodeError::io_with_path(io, "/tmp/x") {
            NodeError::Io { path, source, .. } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/x")));
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
