//! Docs Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A docs pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for docs pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Fetching the source archive over HTTP failed.
    #[display("archive download failed: {_0}")]
    Download(#[error(not(source))] String),
    /// The downloaded archive could not be unpacked.
    #[display("archive unpack failed")]
    Archive,
    /// The docs configuration could not be parsed.
    #[display("invalid docs configuration")]
    Config,
    /// The extractor capability failed to produce a bundle.
    #[display("documentation extraction failed")]
    Extract,
    /// The bundle could not be serialized for upload.
    #[display("bundle serialization failed")]
    Serialize,
    /// The file store rejected the bundle upload.
    #[display("bundle upload failed")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download(_) | Self::Store)
    }
}
