//! Error types for gallery-dl
//!
//! This module provides the error taxonomy for the library:
//! - Transient transport failures surface as [`Error::Network`] or
//!   [`Error::Io`] and are classified retryable by the retry policy
//! - Structural page problems surface as [`Error::Parse`] and are never retried
//! - Task state-machine violations surface as [`TaskError`]
//! - Cooperative cancellation surfaces as [`Error::Cancelled`], which is a
//!   terminal signal rather than a fault

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gallery-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gallery-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_workers")
        key: Option<String>,
    },

    /// Network error (listing page, item page, or payload transfer)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page content was structurally unexpected (missing title, payload link, etc.)
    ///
    /// Parse errors are fatal for their scope and never retried: a listing page
    /// that cannot be parsed fails the whole task, an item page that cannot be
    /// parsed fails only that item.
    #[error("parse error: {0}")]
    Parse(String),

    /// Task state-machine error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Ledger file could not be read or understood
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Task or resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// The task was cancelled at a checkpoint
    ///
    /// Not a fault: cancellation is a terminal state requested by the caller.
    #[error("cancelled")]
    Cancelled,

    /// URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (image converter, 7z, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task state-machine errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found in the registry
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: u64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task ID that is in an invalid state for the operation
        id: u64,
        /// The operation that was attempted (e.g., "start", "pause", "cancel")
        operation: String,
        /// The current state that prevents the operation (e.g., "running", "completed")
        current_state: String,
    },

    /// Removal attempted while the task is running
    #[error("cannot remove task {id} while it is running")]
    StillRunning {
        /// The task ID that is still running
        id: u64,
    },
}

/// Ledger file errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger file missing a required section
    #[error("ledger at {path} is missing the [{section}] section")]
    MissingSection {
        /// Path of the ledger file
        path: PathBuf,
        /// The section that was expected
        section: String,
    },

    /// Ledger file missing a required key
    #[error("ledger at {path} is missing the {key} key")]
    MissingKey {
        /// Path of the ledger file
        path: PathBuf,
        /// The key that was expected
        key: String,
    },

    /// Ledger line could not be understood
    #[error("malformed ledger line {line}: {content}")]
    MalformedLine {
        /// 1-based line number
        line: usize,
        /// The offending line content
        content: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_invalid_state_display_names_operation_and_state() {
        let err = TaskError::InvalidState {
            id: 7,
            operation: "pause".to_string(),
            current_state: "completed".to_string(),
        };
        assert_eq!(err.to_string(), "cannot pause task 7 in state completed");
    }

    #[test]
    fn cancelled_is_not_reported_as_a_fault_message() {
        assert_eq!(Error::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn io_error_converts_via_from() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk").into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn ledger_missing_section_display_includes_path_and_section() {
        let err = LedgerError::MissingSection {
            path: PathBuf::from("/tmp/task_info.ini"),
            section: "Gallery".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/task_info.ini"), "message was: {msg}");
        assert!(msg.contains("[Gallery]"), "message was: {msg}");
    }
}
