//! In-memory storage backend for testing.

use crate::backend::FileStore;
use crate::error::{ErrorKind, Result};
use crate::path::{validate as validate_path, validate_bucket};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Objects live in a `HashMap` behind a [`RwLock`], so all trait methods
/// operate on `&self` without external synchronisation. Ideal for unit tests
/// that need a [`FileStore`] without filesystem or network dependencies.
#[derive(Default)]
pub struct MockBackend {
    storage: RwLock<HashMap<(String, PathBuf), Vec<u8>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, across all buckets.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    fn key(bucket: &str, path: &Path) -> Result<(String, PathBuf)> {
        let bucket = validate_bucket(bucket)?;
        Ok((bucket.to_string(), validate_path(path)?))
    }
}

#[async_trait]
impl FileStore for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn save(&self, bucket: &str, path: &Path, data: &[u8]) -> Result<String> {
        let key = Self::key(bucket, path)?;
        let url = format!("mock://{}/{}", key.0, key.1.display());
        self.storage.write().await.insert(key, data.to_vec());
        Ok(url)
    }

    async fn read(&self, bucket: &str, path: &Path) -> Result<Vec<u8>> {
        let key = Self::key(bucket, path)?;
        self.storage
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.1)))
    }

    async fn exists(&self, bucket: &str, path: &Path) -> Result<bool> {
        let key = Self::key(bucket, path)?;
        Ok(self.storage.read().await.contains_key(&key))
    }

    async fn delete(&self, bucket: &str, path: &Path) -> Result<()> {
        let key = Self::key(bucket, path)?;
        self.storage
            .write()
            .await
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_read() {
        let backend = MockBackend::new();
        let url = backend.save("docs", Path::new("a/docs.json"), b"hello").await.unwrap();
        assert_eq!(url, "mock://docs/a/docs.json");
        assert_eq!(backend.read("docs", Path::new("a/docs.json")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_buckets_are_disjoint() {
        let backend = MockBackend::new();
        backend.save("one", Path::new("docs.json"), b"1").await.unwrap();
        backend.save("two", Path::new("docs.json"), b"2").await.unwrap();
        assert_eq!(backend.read("one", Path::new("docs.json")).await.unwrap(), b"1");
        assert_eq!(backend.read("two", Path::new("docs.json")).await.unwrap(), b"2");
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::new();
        let err = backend.read("docs", Path::new("missing.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_overwrite_is_idempotent() {
        let backend = MockBackend::new();
        let first = backend.save("docs", Path::new("docs.json"), b"one").await.unwrap();
        let second = backend.save("docs", Path::new("docs.json"), b"two").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.read("docs", Path::new("docs.json")).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::new();
        assert!(backend.read("docs", Path::new("../etc/passwd")).await.is_err());
        assert!(backend.save("docs", Path::new("../escape"), b"bad").await.is_err());
    }
}
