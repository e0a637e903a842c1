//! Sync Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A sync engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The persistent store failed. Always fatal: advancing past a write we
    /// cannot trust would silently diverge from on-disk state.
    #[display("persistent store failure")]
    Store,
    /// A registry request failed.
    #[display("registry request failed")]
    Registry,
    /// A code-host request failed.
    #[display("code-host request failed")]
    Host,
    /// A documentation build failed.
    #[display("documentation build failed")]
    Build,
}

impl ErrorKind {
    /// Returns `true` if this error must stop the owning loop instead of
    /// being logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}
