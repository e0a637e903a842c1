//! Code-Host Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A code-host error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for code-host operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Building the HTTP client failed.
    #[display("HTTP client construction failed")]
    Client,
    /// A code-host request failed (network error or error status).
    #[display("code-host request failed: {_0}")]
    Http(#[error(not(source))] String),
    /// A code-host response body could not be decoded.
    #[display("unexpected code-host response")]
    Decode,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}
