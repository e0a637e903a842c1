//! Storage backend trait and implementations.
//!
//! This module defines the [`FileStore`] trait, which provides a unified
//! interface for persisting documentation bundles across different backends
//! (local filesystem, S3-compatible services, etc.). Bundles are addressed
//! by a bucket name plus a bucket-relative path; saving returns a stable URL
//! that gets recorded on the owning version row.

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for documentation bundle storage.
///
/// All operations are asynchronous to efficiently handle network backends.
/// Writes are the hot path: a bundle is saved once per build and overwritten
/// on every rebuild of the same source state, so [`save`](Self::save) must be
/// idempotent — same (bucket, path) always maps to the same returned URL.
///
/// # Path Handling
/// All paths are relative to the bucket and are validated with
/// [`validate_path`](crate::validate_path) before use; implementations must
/// enforce this validation.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Persist `data` at `(bucket, path)`, overwriting any previous content.
    ///
    /// Returns the URL at which the stored object is reachable. Repeated
    /// saves of the same (bucket, path) return the same URL.
    async fn save(&self, bucket: &str, path: &Path, data: &[u8]) -> Result<String>;

    /// Read the stored object back.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing has
    /// been saved at `(bucket, path)`.
    async fn read(&self, bucket: &str, path: &Path) -> Result<Vec<u8>>;

    /// Check whether an object exists at `(bucket, path)`.
    async fn exists(&self, bucket: &str, path: &Path) -> Result<bool>;

    /// Delete the object at `(bucket, path)`.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn delete(&self, bucket: &str, path: &Path) -> Result<()>;
}
