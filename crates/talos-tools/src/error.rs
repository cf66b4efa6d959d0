//! Error types for talos-tools

use thiserror::Error;

/// Tool error type
#[derive(Debug, Error)]
pub enum Error {
    /// No tool with the requested name is mounted
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// Input failed validation or could not be parsed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tool execution failed
    #[error("execution error: {0}")]
    Execution(String),

    /// Operation blocked by a safety guard
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Tool execution exceeded its time budget
    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Tool name
        tool: String,
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// Dispatch was cancelled before all calls finished
    #[error("dispatch cancelled")]
    Cancelled,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
