//! Error types for nbdoctest
//!
//! Availability errors are kept distinct from everything else: they mean
//! "this run is not applicable" and map to the skip exit code instead of a
//! test failure.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nbdoctest
#[derive(Error, Debug)]
pub enum Error {
    // === Environment Errors ===
    #[error("{0} is needed to run this harness")]
    RuntimeUnavailable(String),

    // === Kernel Errors ===
    #[error("Kernel failed to start: {0}")]
    KernelStartFailed(String),

    #[error("Kernel process exited unexpectedly")]
    KernelDied,

    #[error("Kernel protocol error: {0}")]
    KernelProtocol(String),

    #[error("Kernel request '{msg_type}' failed: {message}")]
    KernelRequestFailed { msg_type: String, message: String },

    #[error("ZeroMQ error: {0}")]
    Zmq(String),

    // === Timeout Errors ===
    #[error("Timed out after {:.1} seconds waiting for {what}", .after.as_secs_f64())]
    Timeout { what: String, after: Duration },

    // === Notebook Errors ===
    #[error("Invalid notebook '{path}': {error}")]
    NotebookParse { path: String, error: String },

    #[error("Invalid ignore pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },

    // === Model Checking Errors ===
    #[error("Model checker error: {0}")]
    ModelCheck(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a timeout error for a named wait
    pub fn timeout(what: &str, after: Duration) -> Self {
        Self::Timeout {
            what: what.to_string(),
            after,
        }
    }

    /// Create a kernel request failed error
    pub fn kernel_request_failed(msg_type: &str, message: &str) -> Self {
        Self::KernelRequestFailed {
            msg_type: msg_type.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error means the run is not applicable rather than broken
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::RuntimeUnavailable(_))
    }
}

impl From<zeromq::ZmqError> for Error {
    fn from(e: zeromq::ZmqError) -> Self {
        Self::Zmq(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let e = Error::timeout("execute_reply", Duration::from_secs(30));
        assert_eq!(
            e.to_string(),
            "Timed out after 30.0 seconds waiting for execute_reply"
        );
    }

    #[test]
    fn test_only_runtime_unavailable_is_skip() {
        assert!(Error::RuntimeUnavailable("IPython".into()).is_unavailable());
        assert!(!Error::KernelDied.is_unavailable());
    }
}
