//! Error types for hopsync
//!
//! This module defines all error types used throughout the application,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hopsync operations
#[derive(Error, Debug)]
pub enum HopsyncError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Remote endpoint returned an unexpected HTTP status
    #[error("bad status {status} from {url}")]
    BadStatus { status: u16, url: String },

    /// Remote endpoint returned fewer bytes than it promised
    #[error("short read on '{path}': expected {expected} bytes, got {actual}")]
    ShortRead {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Transport-level failure (connection refused, reset, DNS failure, ...)
    #[error("transport error talking to '{url}': {message}")]
    Transport { url: String, message: String },

    /// The server returned a body that didn't decode as the expected JSON shape
    #[error("malformed response from '{url}': {message}")]
    MalformedResponse { url: String, message: String },

    /// Invalid run configuration, detected before any work starts
    #[error("configuration error: {0}")]
    Config(String),

    /// An invariant was violated; the process cannot continue safely
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl HopsyncError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a transport error
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for hopsync operations
pub type Result<T> = std::result::Result<T, HopsyncError>;

impl From<std::io::Error> for HopsyncError {
    fn from(err: std::io::Error) -> Self {
        HopsyncError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for HopsyncError {
    fn from(err: serde_json::Error) -> Self {
        HopsyncError::MalformedResponse {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for HopsyncError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        HopsyncError::Transport {
            url,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = HopsyncError::io("/test/path", io_err);
        match err {
            HopsyncError::Io { path, .. } => assert_eq!(path, PathBuf::from("/test/path")),
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn display_messages_include_context() {
        let err = HopsyncError::BadStatus {
            status: 503,
            url: "http://x/fetch".into(),
        };
        assert!(err.to_string().contains("503"));

        let err = HopsyncError::Config("bad threads".into());
        assert!(err.to_string().contains("bad threads"));
    }
}
