//! Local filesystem storage backend.
//!
//! Buckets map to directories under a configured root; saved bundles are
//! addressed with `file://` URLs. This is the development/test default — the
//! production deployment uses the S3 backend.

use crate::backend::FileStore;
use crate::error::{ErrorKind, Result};
use crate::path::{validate as validate_path, validate_bucket};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend.
///
/// Stores bundles at `{root}/{bucket}/{path}`. The root must be an absolute
/// path so that the returned `file://` URLs are stable regardless of the
/// process working directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Non-async is fine here; this only happens once at startup and
            // it's not worth making the constructor async for it.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Get the absolute path for a (bucket, relative path) pair.
    fn absolute_path(&self, bucket: &str, path: impl AsRef<Path>) -> Result<PathBuf> {
        let bucket = validate_bucket(bucket)?;
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(bucket).join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl FileStore for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, bucket: &str, path: &Path, data: &[u8]) -> Result<String> {
        let abs_path = self.absolute_path(bucket, path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?;
        tracing::debug!(backend = %self.name, bucket, path = %path.display(), "bundle saved");
        Ok(format!("file://{}", abs_path.display()))
    }

    async fn read(&self, bucket: &str, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(bucket, path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn exists(&self, bucket: &str, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(bucket, path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn delete(&self, bucket: &str, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(bucket, path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}
