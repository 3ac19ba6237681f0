//! Error types for directory lookups.

use thiserror::Error;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur resolving cluster resources.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Credential or endpoint configuration problems. Fatal to the
    /// process.
    #[error("cluster configuration: {0}")]
    Config(String),

    /// The connection check failed on every bounded attempt. Fatal.
    #[error("cluster unreachable after {attempts} attempts: {last}")]
    Unreachable { attempts: u32, last: String },

    /// Transport-level failure on a single lookup.
    #[error("cluster request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The resource disappeared between detection and resolution.
    /// Recoverable: log and skip.
    #[error("not found: {0}")]
    NotFound(String),

    /// The object payload did not match the expected shape.
    #[error("malformed object: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DirectoryError {
    /// Whether this failure should degrade the result set rather than
    /// the run.
    pub fn is_skippable(&self) -> bool {
        matches!(self, DirectoryError::NotFound(_))
    }
}
